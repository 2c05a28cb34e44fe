// SPDX-License-Identifier: GPL-3.0-only

//! Settings file and the configuration provider used by the interception layer

use crate::constants::config::{APP_DIR, DIR_ENV, FILE_NAME, RELOAD_DEBOUNCE};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

/// Persisted settings
///
/// Field names are the JSON keys of `cs_config.json`. Unknown keys are ignored.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Pass every camera call through unmodified
    pub disable_module: bool,
    /// Let the primary preview player emit audio
    pub play_video_sound: bool,
    /// Hand media to players as an open file descriptor instead of a path
    pub force_private_dir: bool,
    /// Suppress user-visible notices
    pub disable_toast: bool,
    /// File name of the selected substitute video inside the media directory
    pub selected_video: Option<String>,
    /// Clockwise rotation applied to composited frames, in degrees
    pub video_rotation_offset: i32,
    /// Replace still captures with injected images
    pub enable_photo_fake: bool,
    /// Directory holding substitute videos (defaults to the config directory)
    pub media_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disable_module: false,
            play_video_sound: false,
            force_private_dir: false,
            disable_toast: false,
            selected_video: None,
            video_rotation_offset: 0,
            enable_photo_fake: false,
            media_dir: None,
        }
    }
}

/// Read-mostly view of the settings consumed by the core
pub trait ConfigProvider: Send + Sync {
    /// Current settings, reloading if the debounce interval has passed
    fn current(&self) -> Config;

    /// Reload ignoring the debounce interval
    fn force_refresh(&self) -> Config;

    /// Backing settings file; `None` for in-memory settings
    fn settings_file(&self) -> Option<&Path> {
        None
    }

    fn disable_module(&self) -> bool {
        self.current().disable_module
    }

    fn enable_photo_fake(&self) -> bool {
        self.current().enable_photo_fake
    }

    fn play_video_sound(&self) -> bool {
        self.current().play_video_sound
    }

    fn video_rotation_offset(&self) -> i32 {
        self.current().video_rotation_offset
    }

    fn force_private_dir(&self) -> bool {
        self.current().force_private_dir
    }

    fn disable_toast(&self) -> bool {
        self.current().disable_toast
    }
}

/// Resolve the configuration directory
///
/// `CAMSWAP_CONFIG_DIR` wins over the platform config dir.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}

struct CachedConfig {
    config: Config,
    last_reload: Option<Instant>,
    modified: Option<SystemTime>,
}

/// File-backed configuration with a reload debounce
pub struct ConfigManager {
    path: Option<PathBuf>,
    cached: Mutex<CachedConfig>,
}

impl ConfigManager {
    /// Load from `dir/cs_config.json`
    ///
    /// A missing or malformed file yields defaults.
    pub fn open(dir: &Path) -> Self {
        let manager = Self {
            path: Some(dir.join(FILE_NAME)),
            cached: Mutex::new(CachedConfig {
                config: Config::default(),
                last_reload: None,
                modified: None,
            }),
        };
        manager.force_reload();
        manager
    }

    /// Load from the default config directory
    pub fn open_default() -> Result<Self, ConfigError> {
        Ok(Self::open(&default_config_dir()?))
    }

    /// Settings held in memory only; reloads keep the given values
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            cached: Mutex::new(CachedConfig {
                config,
                last_reload: None,
                modified: None,
            }),
        }
    }

    /// Path of the settings file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory that holds the settings file
    pub fn dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    /// Reload unless the last reload is younger than the debounce interval
    pub fn reload(&self) -> Config {
        let Ok(mut cached) = self.cached.lock() else {
            return Config::default();
        };
        let fresh = cached
            .last_reload
            .is_some_and(|at| at.elapsed() < RELOAD_DEBOUNCE);
        if !fresh {
            self.load_into(&mut cached);
        }
        cached.config.clone()
    }

    /// Reload now
    pub fn force_reload(&self) -> Config {
        let Ok(mut cached) = self.cached.lock() else {
            return Config::default();
        };
        self.load_into(&mut cached);
        cached.config.clone()
    }

    /// Modification time of the settings file at the last reload
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.cached.lock().ok().and_then(|c| c.modified)
    }

    /// Replace the settings and persist them
    pub fn update<F: FnOnce(&mut Config)>(&self, change: F) -> Result<Config, ConfigError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| ConfigError::Io("config lock poisoned".to_string()))?;
        change(&mut cached.config);
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&cached.config)?;
            std::fs::write(path, json)?;
            cached.modified = file_modified(path);
            info!(path = %path.display(), "Settings saved");
        }
        cached.last_reload = Some(Instant::now());
        Ok(cached.config.clone())
    }

    /// Persist a new selected video
    pub fn set_selected_video(&self, name: &str) -> Result<Config, ConfigError> {
        let name = name.to_string();
        self.update(move |config| config.selected_video = Some(name))
    }

    fn load_into(&self, cached: &mut CachedConfig) {
        cached.last_reload = Some(Instant::now());
        let Some(path) = &self.path else {
            return;
        };
        match read_config(path) {
            Ok(Some(config)) => {
                debug!(path = %path.display(), "Settings reloaded");
                cached.config = config;
            }
            Ok(None) => {
                debug!(path = %path.display(), "No settings file, using defaults");
                cached.config = Config::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Settings unreadable, keeping previous values");
            }
        }
        cached.modified = file_modified(path);
    }
}

impl ConfigProvider for ConfigManager {
    fn current(&self) -> Config {
        self.reload()
    }

    fn force_refresh(&self) -> Config {
        self.force_reload()
    }

    fn settings_file(&self) -> Option<&Path> {
        self.path()
    }
}

fn read_config(path: &Path) -> Result<Option<Config>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn file_modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
