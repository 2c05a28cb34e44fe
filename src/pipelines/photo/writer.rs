// SPDX-License-Identifier: MPL-2.0

//! Still-image delivery queues
//!
//! An [`ImageQueue`] is the host's still-image consumer: the camera (or the
//! injector) appends images and the host acquires them after its
//! "image available" listener fires. An [`ImageWriter`] is the producer side
//! used for injection. It never blocks: when no slot is free, dequeue returns
//! `None`.

use crate::errors::PhotoError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Pixel format of a queue's images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Single plane of compressed JPEG bytes
    Jpeg,
}

/// One delivered still image
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// JPEG images carry exactly one plane
    pub planes: Vec<Vec<u8>>,
    pub timestamp: SystemTime,
}

impl Image {
    /// Bytes of the first plane
    pub fn data(&self) -> &[u8] {
        self.planes.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

type ImageListener = Arc<dyn Fn(&ImageQueue) + Send + Sync>;

/// Bounded queue of delivered images owned by the host
pub struct ImageQueue {
    width: u32,
    height: u32,
    format: ImageFormat,
    max_images: usize,
    plane_capacity: usize,
    images: Mutex<VecDeque<Image>>,
    listener: Mutex<Option<ImageListener>>,
}

impl ImageQueue {
    /// JPEG queue with the plane capacity a camera would allocate for the size
    pub fn jpeg(width: u32, height: u32, max_images: usize) -> Arc<Self> {
        Self::with_capacity(width, height, max_images, jpeg_plane_capacity(width, height))
    }

    pub fn with_capacity(
        width: u32,
        height: u32,
        max_images: usize,
        plane_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            format: ImageFormat::Jpeg,
            max_images: max_images.max(1),
            plane_capacity,
            images: Mutex::new(VecDeque::new()),
            listener: Mutex::new(None),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    pub fn plane_capacity(&self) -> usize {
        self.plane_capacity
    }

    /// Images delivered and not yet acquired
    pub fn len(&self) -> usize {
        self.images.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register the host's "image available" callback
    pub fn set_on_image_available<F>(&self, listener: F)
    where
        F: Fn(&ImageQueue) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(Arc::new(listener));
        }
    }

    /// Oldest delivered image
    pub fn acquire_next_image(&self) -> Option<Image> {
        self.images.lock().ok().and_then(|mut q| q.pop_front())
    }

    /// Newest delivered image, discarding older ones
    pub fn acquire_latest_image(&self) -> Option<Image> {
        let mut queue = self.images.lock().ok()?;
        let latest = queue.pop_back();
        queue.clear();
        latest
    }

    /// Append an image and notify the host
    pub(crate) fn deliver(&self, image: Image) -> Result<(), PhotoError> {
        {
            let mut queue = self.images.lock().map_err(|_| PhotoError::QueueFull)?;
            if queue.len() >= self.max_images {
                return Err(PhotoError::QueueFull);
            }
            queue.push_back(image);
        }
        let listener = self.listener.lock().ok().and_then(|l| l.clone());
        if let Some(listener) = listener {
            listener(self);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ImageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageQueue")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("max_images", &self.max_images)
            .field("plane_capacity", &self.plane_capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// Upper bound of a JPEG plane for the size, as cameras allocate it
pub fn jpeg_plane_capacity(width: u32, height: u32) -> usize {
    // Uncompressed RGB plus header room
    (width as usize * height as usize * 3).max(64 * 1024)
}

/// Writable slot handed out by [`ImageWriter::dequeue_input_image`]
#[derive(Debug)]
pub struct WritableImage {
    width: u32,
    height: u32,
    format: ImageFormat,
    capacity: usize,
    plane: Vec<u8>,
}

impl WritableImage {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fill the single plane; fails if the bytes exceed the capacity
    pub fn write_plane(&mut self, bytes: &[u8]) -> Result<(), PhotoError> {
        if bytes.len() > self.capacity {
            return Err(PhotoError::TooLarge {
                size: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.plane.clear();
        self.plane.extend_from_slice(bytes);
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.plane.len()
    }
}

/// Producer bound to one host image queue
pub struct ImageWriter {
    queue: Arc<ImageQueue>,
    depth: usize,
    in_flight: AtomicUsize,
}

impl ImageWriter {
    pub fn new(queue: Arc<ImageQueue>, depth: usize) -> Self {
        Self {
            queue,
            depth: depth.max(1),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn queue(&self) -> &Arc<ImageQueue> {
        &self.queue
    }

    fn slots(&self) -> usize {
        self.depth.min(self.queue.max_images())
    }

    /// Non-blocking; `None` when every slot is queued or in flight
    pub fn dequeue_input_image(&self) -> Option<WritableImage> {
        let slots = self.slots();
        let reserved = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |in_flight| {
                (self.queue.len() + in_flight < slots).then_some(in_flight + 1)
            });
        if reserved.is_err() {
            debug!(slots, "No writable image slot");
            return None;
        }
        let (width, height) = self.queue.size();
        Some(WritableImage {
            width,
            height,
            format: self.queue.format(),
            capacity: self.queue.plane_capacity(),
            plane: Vec::new(),
        })
    }

    /// Deliver a filled slot to the host queue
    pub fn queue_input_image(&self, image: WritableImage) -> Result<(), PhotoError> {
        self.release_slot();
        self.queue.deliver(Image {
            width: image.width,
            height: image.height,
            format: image.format,
            planes: vec![image.plane],
            timestamp: SystemTime::now(),
        })
    }

    /// Return a slot without delivering it
    pub fn discard(&self, image: WritableImage) {
        drop(image);
        self.release_slot();
    }

    fn release_slot(&self) {
        if self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            warn!("Image slot released twice");
        }
    }
}
