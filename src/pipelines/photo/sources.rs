// SPDX-License-Identifier: MPL-2.0

//! Photo production strategies
//!
//! Tried in order until one yields an image:
//!
//! 1. readback of the active compositor channel
//! 2. the most recent raw NV21 preview frame
//! 3. a decoded frame of the substitute media at the playback position
//! 4. a black placeholder

use crate::media::{FrameSnapshotter, MediaSourceProvider, Nv21Frame};
use crate::pipelines::playback::PlaybackOrchestrator;
use image::RgbImage;
use image::imageops::FilterType;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Requested output size of a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoRequest {
    pub width: u32,
    pub height: u32,
}

impl PhotoRequest {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Use `fallback` for any zero dimension
    pub fn or_default(size: Option<(u32, u32)>, fallback: (u32, u32)) -> Self {
        match size {
            Some((w, h)) if w > 0 && h > 0 => Self::new(w, h),
            _ => Self::new(fallback.0, fallback.1),
        }
    }
}

/// One production tier
pub trait PhotoSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// An image at the requested size, or `None` to fall through
    fn attempt(&self, request: &PhotoRequest) -> Option<RgbImage>;
}

fn fit(image: RgbImage, request: &PhotoRequest) -> RgbImage {
    if image.dimensions() == (request.width, request.height) {
        image
    } else {
        image::imageops::resize(&image, request.width, request.height, FilterType::Triangle)
    }
}

/// Latest NV21 frame handed to the host's preview callback
#[derive(Debug, Default)]
pub struct RawFrameStore {
    latest: Mutex<Option<Nv21Frame>>,
}

impl RawFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Nv21Frame) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(frame);
        }
    }

    pub fn latest(&self) -> Option<Nv21Frame> {
        self.latest.lock().ok().and_then(|l| l.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }
}

pub struct ChannelCaptureSource {
    playback: Arc<PlaybackOrchestrator>,
}

impl ChannelCaptureSource {
    pub fn new(playback: Arc<PlaybackOrchestrator>) -> Self {
        Self { playback }
    }
}

impl PhotoSource for ChannelCaptureSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn attempt(&self, request: &PhotoRequest) -> Option<RgbImage> {
        let channel = self.playback.active_channel()?;
        let rgba = channel.capture_frame(request.width, request.height)?;
        Some(image::DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}

pub struct RawFrameSource {
    frames: Arc<RawFrameStore>,
}

impl RawFrameSource {
    pub fn new(frames: Arc<RawFrameStore>) -> Self {
        Self { frames }
    }
}

impl PhotoSource for RawFrameSource {
    fn name(&self) -> &'static str {
        "raw-preview"
    }

    fn attempt(&self, request: &PhotoRequest) -> Option<RgbImage> {
        let frame = self.frames.latest()?;
        let image = frame.to_rgb_image()?;
        Some(fit(image, request))
    }
}

pub struct MediaSnapshotSource {
    media: Arc<dyn MediaSourceProvider>,
    snapshotter: Arc<dyn FrameSnapshotter>,
    playback: Arc<PlaybackOrchestrator>,
}

impl MediaSnapshotSource {
    pub fn new(
        media: Arc<dyn MediaSourceProvider>,
        snapshotter: Arc<dyn FrameSnapshotter>,
        playback: Arc<PlaybackOrchestrator>,
    ) -> Self {
        Self {
            media,
            snapshotter,
            playback,
        }
    }
}

impl PhotoSource for MediaSnapshotSource {
    fn name(&self) -> &'static str {
        "media-snapshot"
    }

    fn attempt(&self, request: &PhotoRequest) -> Option<RgbImage> {
        let path = self.media.current_path()?;
        let position = self.playback.playback_position().unwrap_or_default();
        let frame = match self.snapshotter.frame_at(&path, position) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Media snapshot failed");
                return None;
            }
        };
        Some(fit(frame.to_rgb_image()?, request))
    }
}

/// Always succeeds
pub struct PlaceholderSource;

impl PhotoSource for PlaceholderSource {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn attempt(&self, request: &PhotoRequest) -> Option<RgbImage> {
        Some(RgbImage::new(request.width.max(1), request.height.max(1)))
    }
}

/// Standard production order
pub fn default_sources(
    playback: Arc<PlaybackOrchestrator>,
    frames: Arc<RawFrameStore>,
    media: Arc<dyn MediaSourceProvider>,
    snapshotter: Arc<dyn FrameSnapshotter>,
) -> Vec<Box<dyn PhotoSource>> {
    vec![
        Box::new(ChannelCaptureSource::new(Arc::clone(&playback))),
        Box::new(RawFrameSource::new(frames)),
        Box::new(MediaSnapshotSource::new(media, snapshotter, playback)),
        Box::new(PlaceholderSource),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VideoFrame;

    #[test]
    fn test_request_defaults_zero_sizes() {
        assert_eq!(
            PhotoRequest::or_default(Some((0, 480)), (1280, 720)),
            PhotoRequest::new(1280, 720)
        );
        assert_eq!(
            PhotoRequest::or_default(Some((320, 240)), (1280, 720)),
            PhotoRequest::new(320, 240)
        );
    }

    #[test]
    fn test_raw_frame_scaled_to_request() {
        let store = Arc::new(RawFrameStore::new());
        let source = RawFrameSource::new(Arc::clone(&store));
        let request = PhotoRequest::new(8, 6);
        assert!(source.attempt(&request).is_none());

        let rgba = VideoFrame::solid(4, 4, [200, 200, 200, 255], 0);
        store.store(Nv21Frame::from_rgba(&rgba, 4, 4).unwrap());
        let image = source.attempt(&request).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
    }

    #[test]
    fn test_placeholder_is_black_at_size() {
        let image = PlaceholderSource.attempt(&PhotoRequest::new(3, 2)).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
