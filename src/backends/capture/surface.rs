// SPDX-License-Identifier: MPL-2.0

//! Output targets registered by the host
//!
//! A target is anything frames can be presented to: a named preview surface,
//! an anonymous still-image reader, or the interception layer's own virtual
//! sink. Identity is a [`SurfaceId`], never pointer equality.

use crate::errors::CompositorError;
use crate::media::frame::VideoFrame;
use crate::media::player::FrameSink;
use crate::pipelines::photo::ImageQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Stable identity of a target surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough to tell targets apart in logs
        let id = self.0.simple().to_string();
        write!(f, "{}", &id[..8])
    }
}

/// A host output destination
pub trait TargetSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Human-visible name; `None` for anonymous buffer queues (readers)
    fn name(&self) -> Option<&str>;

    /// Current buffer size in pixels; may change between frames
    fn size(&self) -> (u32, u32);

    /// `false` once the host released the surface
    fn is_valid(&self) -> bool {
        true
    }

    /// Whether a graphics window surface may be attached right now
    fn accepts_window(&self) -> bool {
        true
    }

    /// Present one composited frame
    fn queue_frame(&self, frame: VideoFrame) -> Result<(), CompositorError>;

    /// Still-image queue behind this target, if it is an image reader
    fn image_queue(&self) -> Option<Arc<ImageQueue>> {
        None
    }

    fn describe(&self) -> String {
        match self.name() {
            Some(name) => format!("{} [{}]", name, self.id()),
            None => format!("anonymous [{}]", self.id()),
        }
    }
}

/// Frame sink writing straight into a target, without compositing
pub struct TargetSink(pub Arc<dyn TargetSurface>);

impl FrameSink for TargetSink {
    fn deliver(&self, frame: VideoFrame) {
        if let Err(e) = self.0.queue_frame(frame) {
            debug!(target_surface = %self.0.describe(), error = %e, "Passthrough frame dropped");
        }
    }
}

/// Records what was presented to a target
#[derive(Default)]
struct PresentLog {
    latest: Mutex<Option<VideoFrame>>,
    count: AtomicU64,
}

impl PresentLog {
    fn record(&self, frame: VideoFrame) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(frame);
        }
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn latest(&self) -> Option<VideoFrame> {
        self.latest.lock().ok().and_then(|l| l.clone())
    }
}

/// In-memory preview surface
///
/// Stands in for an on-screen view when running without a display. Its size
/// and window acceptance can be changed at runtime.
pub struct HeadlessSurface {
    id: SurfaceId,
    name: String,
    size: Mutex<(u32, u32)>,
    accepts_window: AtomicBool,
    valid: AtomicBool,
    presented: PresentLog,
}

impl HeadlessSurface {
    pub fn preview(name: &str, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId::new(),
            name: name.to_string(),
            size: Mutex::new((width, height)),
            accepts_window: AtomicBool::new(true),
            valid: AtomicBool::new(true),
            presented: PresentLog::default(),
        })
    }

    pub fn set_size(&self, width: u32, height: u32) {
        if let Ok(mut size) = self.size.lock() {
            *size = (width, height);
        }
    }

    pub fn set_accepts_window(&self, accepts: bool) {
        self.accepts_window.store(accepts, Ordering::SeqCst);
    }

    /// Mark the surface released by the host
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.presented.latest()
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented.count.load(Ordering::SeqCst)
    }
}

impl TargetSurface for HeadlessSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn size(&self) -> (u32, u32) {
        self.size.lock().map(|s| *s).unwrap_or((0, 0))
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn accepts_window(&self) -> bool {
        self.accepts_window.load(Ordering::SeqCst)
    }

    fn queue_frame(&self, frame: VideoFrame) -> Result<(), CompositorError> {
        if !self.is_valid() {
            return Err(CompositorError::WindowRejected("surface released".into()));
        }
        self.presented.record(frame);
        Ok(())
    }
}

/// Anonymous still-image consumer backed by an [`ImageQueue`]
pub struct ReaderSurface {
    id: SurfaceId,
    queue: Arc<ImageQueue>,
    accepts_window: AtomicBool,
    presented: PresentLog,
}

impl ReaderSurface {
    pub fn new(queue: Arc<ImageQueue>) -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId::new(),
            queue,
            accepts_window: AtomicBool::new(true),
            presented: PresentLog::default(),
        })
    }

    pub fn jpeg(width: u32, height: u32, max_images: usize) -> Arc<Self> {
        Self::new(ImageQueue::jpeg(width, height, max_images))
    }

    pub fn set_accepts_window(&self, accepts: bool) {
        self.accepts_window.store(accepts, Ordering::SeqCst);
    }

    pub fn queue(&self) -> &Arc<ImageQueue> {
        &self.queue
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented.count.load(Ordering::SeqCst)
    }
}

impl TargetSurface for ReaderSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn size(&self) -> (u32, u32) {
        self.queue.size()
    }

    fn accepts_window(&self) -> bool {
        self.accepts_window.load(Ordering::SeqCst)
    }

    fn queue_frame(&self, frame: VideoFrame) -> Result<(), CompositorError> {
        // Composited stream frames are consumed, not turned into stills
        self.presented.record(frame);
        Ok(())
    }

    fn image_queue(&self) -> Option<Arc<ImageQueue>> {
        Some(Arc::clone(&self.queue))
    }
}

/// The single synthetic target substituted into every session
///
/// Frames the real camera produces into it are discarded.
pub struct VirtualSink {
    id: SurfaceId,
    generation: u64,
    released: AtomicBool,
    discarded: AtomicU64,
}

impl VirtualSink {
    pub const NAME: &'static str = "camswap-virtual-sink";

    pub fn new(generation: u64) -> Arc<Self> {
        Arc::new(Self {
            id: SurfaceId::new(),
            generation,
            released: AtomicBool::new(false),
            discarded: AtomicU64::new(0),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!(generation = self.generation, "Virtual sink released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn frames_discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl TargetSurface for VirtualSink {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        Some(Self::NAME)
    }

    fn size(&self) -> (u32, u32) {
        (1, 1)
    }

    fn is_valid(&self) -> bool {
        !self.is_released()
    }

    fn queue_frame(&self, _frame: VideoFrame) -> Result<(), CompositorError> {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = HeadlessSurface::preview("a", 4, 4);
        let b = HeadlessSurface::preview("a", 4, 4);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_reader_is_anonymous_with_queue() {
        let reader = ReaderSurface::jpeg(640, 480, 2);
        assert!(reader.name().is_none());
        assert_eq!(reader.size(), (640, 480));
        assert!(reader.image_queue().is_some());
        assert!(reader.describe().starts_with("anonymous"));
    }

    #[test]
    fn test_invalid_surface_rejects_frames() {
        let surface = HeadlessSurface::preview("view", 2, 2);
        surface.invalidate();
        assert!(surface.queue_frame(VideoFrame::solid(2, 2, [0; 4], 0)).is_err());
        assert_eq!(surface.frames_presented(), 0);
    }

    #[test]
    fn test_released_sink_is_invalid() {
        let sink = VirtualSink::new(3);
        assert!(sink.is_valid());
        sink.release();
        sink.release();
        assert!(!sink.is_valid());
        assert_eq!(sink.generation(), 3);
    }
}
