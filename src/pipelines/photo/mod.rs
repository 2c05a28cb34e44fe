// SPDX-License-Identifier: MPL-2.0

//! Still-capture replacement
//!
//! When fake photos are enabled the real capture is suppressed and a
//! replacement image is produced and handed to the host:
//!
//! ```text
//! Idle → Suppressed → Producing → Injected | Failed → Idle
//! ```
//!
//! # Session path
//!
//! The addressed reader target is parked in a [`PendingPhotoSlot`] while the
//! request is built. After the build, injection runs deferred: a writable slot
//! is dequeued from the reader's queue first so the encoder knows the buffer
//! capacity, then the image is produced, encoded, copied and enqueued. No
//! free slot means the photo is lost.
//!
//! # Legacy path
//!
//! The image is produced and encoded synchronously and handed to the host's
//! JPEG callback.

pub mod encoding;
pub mod sources;
pub mod writer;

pub use encoding::{EncodedImage, encode_jpeg, encode_within};
pub use sources::{
    ChannelCaptureSource, MediaSnapshotSource, PhotoRequest, PhotoSource, PlaceholderSource,
    RawFrameSource, RawFrameStore, default_sources,
};
pub use writer::{Image, ImageFormat, ImageQueue, ImageWriter, WritableImage};

use crate::backends::capture::{SurfaceId, TargetSurface};
use crate::constants::photo::{LEGACY_DEFAULT_SIZE, SESSION_DEFAULT_SIZE, WRITER_QUEUE_DEPTH};
use crate::errors::PhotoError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Progress of the current still-capture replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoState {
    #[default]
    Idle,
    Suppressed,
    Producing,
    Injected,
    Failed,
}

/// Single-slot register for the reader a suppressed capture addresses
#[derive(Default)]
pub struct PendingPhotoSlot {
    slot: Mutex<Option<Arc<dyn TargetSurface>>>,
}

impl PendingPhotoSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a target, replacing any earlier one
    pub fn store(&self, target: Arc<dyn TargetSurface>) {
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(previous) = slot.replace(target) {
                debug!(target_surface = %previous.describe(), "Pending photo target replaced");
            }
        }
    }

    pub fn take(&self) -> Option<Arc<dyn TargetSurface>> {
        self.slot.lock().ok().and_then(|mut s| s.take())
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_ok_and(|s| s.is_some())
    }

    pub fn clear(&self) {
        self.take();
    }
}

pub struct PhotoInjector {
    sources: Vec<Box<dyn PhotoSource>>,
    writers: Mutex<HashMap<SurfaceId, Arc<ImageWriter>>>,
    state: Mutex<PhotoState>,
    last_outcome: Mutex<Option<PhotoState>>,
    injected: AtomicU64,
    failed: AtomicU64,
}

impl PhotoInjector {
    pub fn new(sources: Vec<Box<dyn PhotoSource>>) -> Self {
        Self {
            sources,
            writers: Mutex::new(HashMap::new()),
            state: Mutex::new(PhotoState::Idle),
            last_outcome: Mutex::new(None),
            injected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: PhotoState) {
        if let Ok(mut current) = self.state.lock() {
            debug!(from = ?*current, to = ?state, "Photo state");
            *current = state;
        }
    }

    /// Real capture suppressed, production pending
    pub fn suppress(&self) {
        self.set_state(PhotoState::Suppressed);
    }

    fn finish(&self, outcome: PhotoState) {
        self.set_state(outcome);
        match outcome {
            PhotoState::Injected => self.injected.fetch_add(1, Ordering::SeqCst),
            _ => self.failed.fetch_add(1, Ordering::SeqCst),
        };
        if let Ok(mut last) = self.last_outcome.lock() {
            *last = Some(outcome);
        }
        self.set_state(PhotoState::Idle);
    }

    pub fn state(&self) -> PhotoState {
        self.state.lock().map_or(PhotoState::Idle, |s| *s)
    }

    /// Result of the most recent attempt
    pub fn last_outcome(&self) -> Option<PhotoState> {
        self.last_outcome.lock().ok().and_then(|o| *o)
    }

    pub fn injected_count(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Run the production tiers until one yields an image that encodes within `capacity`
    pub fn produce(
        &self,
        request: &PhotoRequest,
        capacity: usize,
    ) -> Result<EncodedImage, PhotoError> {
        let mut last_error = PhotoError::NoImage;
        for source in &self.sources {
            let Some(image) = source.attempt(request) else {
                debug!(source = source.name(), "Photo source produced nothing");
                continue;
            };
            match encode_within(&image, capacity) {
                Ok(encoded) => {
                    info!(
                        source = source.name(),
                        width = encoded.width,
                        height = encoded.height,
                        size = encoded.data.len(),
                        "Photo produced"
                    );
                    return Ok(encoded);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Photo source rejected");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn writer_for(&self, target: &dyn TargetSurface) -> Result<Arc<ImageWriter>, PhotoError> {
        let queue = target.image_queue().ok_or(PhotoError::NotAReader)?;
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| PhotoError::EncodingFailed("writer table poisoned".into()))?;
        let writer = writers.entry(target.id()).or_insert_with(|| {
            debug!(target_surface = %target.describe(), "Image writer created");
            Arc::new(ImageWriter::new(queue, WRITER_QUEUE_DEPTH))
        });
        Ok(Arc::clone(writer))
    }

    /// Produce a photo and enqueue it into the reader's image queue
    pub fn inject(&self, target: &dyn TargetSurface) -> Result<(), PhotoError> {
        self.set_state(PhotoState::Producing);
        let result = self.try_inject(target);
        match &result {
            Ok(()) => {
                info!(target_surface = %target.describe(), "Photo injected");
                self.finish(PhotoState::Injected);
            }
            Err(e) => {
                warn!(target_surface = %target.describe(), error = %e, "Photo injection failed");
                self.finish(PhotoState::Failed);
            }
        }
        result
    }

    fn try_inject(&self, target: &dyn TargetSurface) -> Result<(), PhotoError> {
        let writer = self.writer_for(target)?;
        let mut slot = writer.dequeue_input_image().ok_or(PhotoError::QueueFull)?;

        let (width, height) = slot.size();
        let request = PhotoRequest::or_default(Some((width, height)), SESSION_DEFAULT_SIZE);
        let encoded = match self.produce(&request, slot.capacity()) {
            Ok(encoded) => encoded,
            Err(e) => {
                writer.discard(slot);
                return Err(e);
            }
        };
        if let Err(e) = slot.write_plane(&encoded.data) {
            writer.discard(slot);
            return Err(e);
        }
        writer.queue_input_image(slot)
    }

    /// Synchronous JPEG for the single-callback camera path
    pub fn produce_legacy(&self, preview_size: Option<(u32, u32)>) -> Result<EncodedImage, PhotoError> {
        self.set_state(PhotoState::Producing);
        let request = PhotoRequest::or_default(preview_size, LEGACY_DEFAULT_SIZE);
        let result = self.produce(&request, usize::MAX);
        self.finish(if result.is_ok() {
            PhotoState::Injected
        } else {
            PhotoState::Failed
        });
        result
    }

    /// Drop every image writer; called at device boundaries
    pub fn release_writers(&self) {
        if let Ok(mut writers) = self.writers.lock() {
            if !writers.is_empty() {
                debug!(count = writers.len(), "Image writers released");
            }
            writers.clear();
        }
    }

    pub fn writer_count(&self) -> usize {
        self.writers.lock().map_or(0, |w| w.len())
    }
}
