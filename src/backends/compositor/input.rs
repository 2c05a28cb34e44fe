// SPDX-License-Identifier: MPL-2.0

//! Decoder-writable input of a compositor channel
//!
//! Holds only the newest frame. A channel that cannot keep up draws whatever
//! arrived last; older frames are overwritten, never queued.

use crate::media::frame::VideoFrame;
use crate::media::player::FrameSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Frame-arrival callback
///
/// Fired on the decoder thread after every delivered frame. Implementations
/// must only post work, never draw.
pub trait FrameListener: Send + Sync {
    fn on_frame_available(&self);
}

#[derive(Default)]
struct Inner {
    latest: Mutex<Option<VideoFrame>>,
    listener: Mutex<Option<Arc<dyn FrameListener>>>,
    received: AtomicU64,
}

/// Shared handle to a channel's input; clones refer to the same surface
#[derive(Clone, Default)]
pub struct InputSurface {
    inner: Arc<Inner>,
}

impl InputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&self, listener: Arc<dyn FrameListener>) {
        if let Ok(mut slot) = self.inner.listener.lock() {
            *slot = Some(listener);
        }
    }

    pub fn clear_listener(&self) {
        if let Ok(mut slot) = self.inner.listener.lock() {
            slot.take();
        }
    }

    /// Remove and return the newest undrawn frame
    pub fn take_latest(&self) -> Option<VideoFrame> {
        self.inner.latest.lock().ok().and_then(|mut f| f.take())
    }

    /// Total frames delivered since creation
    pub fn frames_received(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }
}

impl FrameSink for InputSurface {
    fn deliver(&self, frame: VideoFrame) {
        if let Ok(mut latest) = self.inner.latest.lock() {
            *latest = Some(frame);
        }
        self.inner.received.fetch_add(1, Ordering::Relaxed);

        // Clone out so the listener runs without the lock held
        let listener = self.inner.listener.lock().ok().and_then(|l| l.clone());
        if let Some(listener) = listener {
            listener.on_frame_available();
        }
    }
}

impl std::fmt::Debug for InputSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSurface")
            .field("frames_received", &self.frames_received())
            .finish()
    }
}
