// SPDX-License-Identifier: MPL-2.0

//! Substitute media selection
//!
//! The library resolves the current video from the settings: the selected
//! file, then `Cam.mp4`, then the first video in the media directory.

use crate::config::{ConfigManager, ConfigProvider};
use crate::constants::media::{DEFAULT_VIDEO_NAME, VIDEO_EXTENSIONS};
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a player reads the substitute media from
#[derive(Debug)]
pub enum MediaSource {
    /// Already-open descriptor (preferred)
    Fd(OwnedFd),
    /// File path
    Path(PathBuf),
}

impl MediaSource {
    /// Location string for logs
    pub fn describe(&self) -> String {
        match self {
            MediaSource::Fd(fd) => {
                use std::os::fd::AsRawFd;
                format!("fd:{}", fd.as_raw_fd())
            }
            MediaSource::Path(path) => path.display().to_string(),
        }
    }
}

/// Supplies the substitute media
pub trait MediaSourceProvider: Send + Sync {
    /// Path of the current media, `None` when nothing is available
    fn current_path(&self) -> Option<PathBuf>;

    /// Open descriptor for the current media, when descriptor delivery is used
    fn current_fd(&self) -> Option<OwnedFd>;

    /// Select the next media; `true` when the selection changed
    fn switch_to_next(&self) -> bool;

    /// Select the previous media; `true` when the selection changed
    fn switch_to_previous(&self) -> bool;

    /// Descriptor if available, otherwise path
    fn open(&self) -> Option<MediaSource> {
        if let Some(fd) = self.current_fd() {
            return Some(MediaSource::Fd(fd));
        }
        self.current_path().map(MediaSource::Path)
    }

    fn is_available(&self) -> bool {
        self.current_path().is_some()
    }
}

/// List video files in `dir` sorted by file name
pub fn list_video_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_video_file(path))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Directory-backed media library driven by the settings file
pub struct MediaLibrary {
    config: Arc<ConfigManager>,
    dir: PathBuf,
}

impl MediaLibrary {
    pub fn new(config: Arc<ConfigManager>, dir: PathBuf) -> Self {
        Self { config, dir }
    }

    /// Media directory from the settings, else the config directory
    pub fn from_config(config: Arc<ConfigManager>) -> Option<Self> {
        let dir = config
            .current()
            .media_dir
            .or_else(|| config.dir().map(Path::to_path_buf))?;
        Some(Self::new(config, dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All videos in the media directory
    pub fn videos(&self) -> Vec<PathBuf> {
        list_video_files(&self.dir)
    }

    fn resolve(&self) -> Option<PathBuf> {
        if let Some(name) = self.config.current().selected_video.filter(|n| !n.is_empty()) {
            let selected = self.dir.join(&name);
            if selected.is_file() {
                return Some(selected);
            }
            debug!(selected = %selected.display(), "Selected video missing, falling back");
        }
        let fallback = self.dir.join(DEFAULT_VIDEO_NAME);
        if fallback.is_file() {
            return Some(fallback);
        }
        self.videos().into_iter().next()
    }

    fn switch(&self, forward: bool) -> bool {
        let files = self.videos();
        if files.is_empty() {
            return false;
        }
        let current = self.resolve();
        let index = current
            .as_ref()
            .and_then(|c| files.iter().position(|f| f == c));
        let next = match index {
            None => 0,
            Some(i) if forward => (i + 1) % files.len(),
            Some(i) => (i + files.len() - 1) % files.len(),
        };
        let Some(name) = files[next].file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if let Err(e) = self.config.set_selected_video(name) {
            warn!(error = %e, "Failed to persist video selection");
            return false;
        }
        let changed = current.as_deref() != Some(files[next].as_path());
        info!(video = name, changed, "Switched substitute video");
        changed
    }
}

impl MediaSourceProvider for MediaLibrary {
    fn current_path(&self) -> Option<PathBuf> {
        self.resolve()
    }

    fn current_fd(&self) -> Option<OwnedFd> {
        if !self.config.current().force_private_dir {
            return None;
        }
        let path = self.resolve()?;
        match File::open(&path) {
            Ok(file) => Some(OwnedFd::from(file)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open media descriptor");
                None
            }
        }
    }

    fn switch_to_next(&self) -> bool {
        self.switch(true)
    }

    fn switch_to_previous(&self) -> bool {
        self.switch(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library_with(files: &[&str]) -> (tempfile::TempDir, MediaLibrary) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let config = Arc::new(ConfigManager::open(dir.path()));
        let library = MediaLibrary::new(config, dir.path().to_path_buf());
        (dir, library)
    }

    #[test]
    fn test_lists_only_videos_sorted() {
        let (_dir, library) = library_with(&["b.MOV", "a.mp4", "notes.txt", "c.mkv"]);
        let names: Vec<String> = library
            .videos()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MOV", "c.mkv"]);
    }

    #[test]
    fn test_default_name_preferred_over_first() {
        let (_dir, library) = library_with(&["a.mp4", "Cam.mp4"]);
        let path = library.current_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "Cam.mp4");
    }

    #[test]
    fn test_empty_directory_has_no_source() {
        let (_dir, library) = library_with(&[]);
        assert!(library.current_path().is_none());
        assert!(library.open().is_none());
        assert!(!library.switch_to_next());
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let (_dir, library) = library_with(&["a.mp4", "b.mp4", "c.mp4"]);
        // Nothing selected and no Cam.mp4: first file is current
        assert!(library.switch_to_next());
        assert_eq!(library.current_path().unwrap().file_name().unwrap(), "b.mp4");
        assert!(library.switch_to_previous());
        assert!(library.switch_to_previous());
        assert_eq!(library.current_path().unwrap().file_name().unwrap(), "c.mp4");
    }

    #[test]
    fn test_fd_only_with_private_delivery() {
        let (_dir, library) = library_with(&["a.mp4"]);
        assert!(library.current_fd().is_none());
        library
            .config
            .update(|c| c.force_private_dir = true)
            .unwrap();
        assert!(matches!(library.open(), Some(MediaSource::Fd(_))));
    }
}
