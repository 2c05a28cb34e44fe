// SPDX-License-Identifier: GPL-3.0-only

//! Machinery shared by the render and relay channels
//!
//! A channel is one compositor thread plus the handles other threads use to
//! talk to it. The thread owns a [`ChannelState`] holding the graphics
//! context; everything else only touches atomics or posts jobs.

use super::graphics::{GraphicsBackend, GraphicsContext, ReleaseStage};
use super::input::{FrameListener, InputSurface};
use super::thread::{CompositorThread, ThreadState};
use super::transform::{Mat4, Viewport, normalize_degrees, rotation_matrix};
use crate::backends::capture::TargetSurface;
use crate::constants::compositor::{
    CAPTURE_TIMEOUT, FRAME_LOG_INTERVAL, INIT_TIMEOUT, RELAY_PBUFFER_SIZE, RELEASE_TIMEOUT,
};
use crate::errors::CompositorError;
use crate::media::frame::flip_vertical;
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Strategy level of the compositor fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositorTier {
    /// Graphics surface attached directly to the target
    Render,
    /// Off-screen context, target attached opportunistically
    Relay,
}

impl CompositorTier {
    pub fn name(&self) -> &'static str {
        match self {
            CompositorTier::Render => "render",
            CompositorTier::Relay => "relay",
        }
    }
}

impl std::fmt::Display for CompositorTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Common contract of both compositor tiers
pub trait Compositor: Send + Sync {
    fn tier(&self) -> CompositorTier;

    /// Surface the decoder writes frames into
    fn input_surface(&self) -> InputSurface;

    /// Takes effect on the next draw
    fn set_rotation(&self, degrees: i32);

    /// Normalized rotation in [0, 360)
    fn rotation(&self) -> i32;

    fn is_initialized(&self) -> bool;

    /// Redraw and read back the current picture, top-down
    fn capture_frame(&self, width: u32, height: u32) -> Option<RgbaImage>;

    /// Tear down; idempotent, waits a bounded time for the thread
    fn release(&self);

    fn frames_drawn(&self) -> u64;

    /// Whether frames currently reach the target
    fn is_attached(&self) -> bool {
        self.is_initialized()
    }
}

/// State readable from any thread
#[derive(Debug, Default)]
pub(crate) struct ChannelShared {
    rotation: AtomicI32,
    initialized: AtomicBool,
    attached: AtomicBool,
    frames_drawn: AtomicU64,
    draw_pending: AtomicBool,
}

/// State owned by the compositor thread
pub(crate) struct ChannelState {
    tier: CompositorTier,
    label: String,
    ctx: Box<dyn GraphicsContext>,
    target: Arc<dyn TargetSurface>,
    input: InputSurface,
    shared: Arc<ChannelShared>,
    has_frame: bool,
    released: bool,
}

impl ChannelState {
    fn viewport(&self) -> Viewport {
        let (width, height) = if self.ctx.has_window() {
            // Queried every frame: the target's buffer may have been resized
            self.target.size()
        } else {
            RELAY_PBUFFER_SIZE
        };
        Viewport::new(width, height)
    }

    fn render(&mut self, viewport: Viewport) -> Result<(), CompositorError> {
        let rotation = self.shared.rotation.load(Ordering::Acquire);
        self.ctx
            .draw(viewport, &rotation_matrix(rotation), &Mat4::flip_y())
    }

    fn upload_latest(&mut self) -> Result<(), CompositorError> {
        if let Some(frame) = self.input.take_latest() {
            self.ctx.update_texture(&frame)?;
            self.has_frame = true;
        }
        Ok(())
    }

    fn try_attach(&mut self) {
        match self.ctx.attach_window(Arc::clone(&self.target)) {
            Ok(()) => {
                self.shared.attached.store(true, Ordering::SeqCst);
                info!(channel = %self.label, target_surface = %self.target.describe(), "Relay attached to target");
            }
            Err(e) => debug!(channel = %self.label, error = %e, "Relay attach retry failed"),
        }
    }

    /// Draw the newest frame; `Ok(false)` when there was nothing to draw
    fn draw_frame(&mut self) -> Result<bool, CompositorError> {
        if self.released {
            return Ok(false);
        }
        self.upload_latest()?;
        if !self.has_frame {
            return Ok(false);
        }
        if self.tier == CompositorTier::Relay && !self.ctx.has_window() {
            self.try_attach();
        }

        let viewport = self.viewport();
        if viewport.is_empty() {
            return Ok(false);
        }
        self.render(viewport)?;
        if self.ctx.has_window() {
            self.ctx.present()?;
        }

        let drawn = self.shared.frames_drawn.fetch_add(1, Ordering::Relaxed) + 1;
        if drawn % FRAME_LOG_INTERVAL == 0 {
            debug!(
                channel = %self.label,
                frames = drawn,
                width = viewport.width,
                height = viewport.height,
                "Compositor drawing"
            );
        }
        Ok(true)
    }

    /// Redraw at the requested size and read back bottom-up rows
    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CompositorError> {
        if self.released {
            return Err(CompositorError::NotInitialized);
        }
        self.upload_latest()?;
        if !self.has_frame {
            return Err(CompositorError::Draw("no frame received yet".into()));
        }
        self.render(Viewport::new(width, height))?;
        self.ctx.read_pixels(width, height)
    }
}

impl ThreadState for ChannelState {
    fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for stage in ReleaseStage::ORDER {
            self.ctx.release_stage(stage);
        }
        debug!(channel = %self.label, "Graphics resources released");
    }
}

/// Posts a draw when a frame arrives, coalescing bursts into one job
struct DrawListener {
    thread: Weak<CompositorThread<ChannelState>>,
    shared: Arc<ChannelShared>,
    label: String,
}

impl FrameListener for DrawListener {
    fn on_frame_available(&self) {
        if self.shared.draw_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(thread) = self.thread.upgrade() else {
            self.shared.draw_pending.store(false, Ordering::Release);
            return;
        };
        let label = self.label.clone();
        let posted = thread.post(move |state| {
            state.shared.draw_pending.store(false, Ordering::Release);
            if let Err(e) = state.draw_frame() {
                warn!(channel = %label, error = %e, "Draw failed");
            }
        });
        if !posted {
            self.shared.draw_pending.store(false, Ordering::Release);
        }
    }
}

/// How a tier prepares a fresh context on the compositor thread
pub(crate) type SetupFn =
    fn(&mut dyn GraphicsContext, &Arc<dyn TargetSurface>) -> Result<(), CompositorError>;

/// Handle side of a channel, shared by both tiers
pub(crate) struct ChannelCore {
    tier: CompositorTier,
    label: String,
    thread: Option<Arc<CompositorThread<ChannelState>>>,
    input: InputSurface,
    shared: Arc<ChannelShared>,
    released: AtomicBool,
}

impl ChannelCore {
    /// Spawn the thread, run `setup` on it and wait for the outcome
    ///
    /// Never fails: a setup error or an expired wait leaves the channel
    /// uninitialized with its thread stopped.
    pub(crate) fn start(
        tier: CompositorTier,
        backend: Arc<dyn GraphicsBackend>,
        target: Arc<dyn TargetSurface>,
        rotation: i32,
        setup: SetupFn,
    ) -> Self {
        Self::start_within(tier, backend, target, rotation, setup, INIT_TIMEOUT)
    }

    pub(crate) fn start_within(
        tier: CompositorTier,
        backend: Arc<dyn GraphicsBackend>,
        target: Arc<dyn TargetSurface>,
        rotation: i32,
        setup: SetupFn,
        init_timeout: Duration,
    ) -> Self {
        let label = format!("{}:{}", tier, target.id());
        let input = InputSurface::new();
        let shared = Arc::new(ChannelShared::default());
        shared
            .rotation
            .store(normalize_degrees(rotation), Ordering::Release);

        let mut core = Self {
            tier,
            label: label.clone(),
            thread: None,
            input: input.clone(),
            shared: Arc::clone(&shared),
            released: AtomicBool::new(false),
        };

        let thread_shared = Arc::clone(&shared);
        let thread_label = label.clone();
        let spawned = CompositorThread::spawn(&label, move || {
            let mut ctx = backend.create_context()?;
            if let Err(e) = setup(ctx.as_mut(), &target) {
                // Nothing of a half-built context may outlive the failure
                for stage in ReleaseStage::ORDER {
                    ctx.release_stage(stage);
                }
                return Err(e);
            }
            thread_shared
                .attached
                .store(ctx.has_window(), Ordering::SeqCst);
            Ok(ChannelState {
                tier,
                label: thread_label,
                ctx,
                target,
                input,
                shared: thread_shared,
                has_frame: false,
                released: false,
            })
        });

        let (thread, ready) = match spawned {
            Ok(pair) => pair,
            Err(e) => {
                warn!(channel = %label, error = %e, "Compositor thread could not start");
                return core;
            }
        };
        let thread = Arc::new(thread);

        match ready.wait(init_timeout) {
            Some(Ok(())) => {
                core.shared.initialized.store(true, Ordering::SeqCst);
                core.input.set_listener(Arc::new(DrawListener {
                    thread: Arc::downgrade(&thread),
                    shared: Arc::clone(&core.shared),
                    label: label.clone(),
                }));
                core.thread = Some(thread);
                info!(channel = %label, "Compositor initialized");
            }
            Some(Err(e)) => {
                warn!(channel = %label, error = %e, "Compositor initialization failed");
                thread.shutdown(RELEASE_TIMEOUT);
            }
            None => {
                warn!(channel = %label, timeout_ms = init_timeout.as_millis() as u64, "Compositor initialization timed out");
                thread.shutdown(RELEASE_TIMEOUT);
            }
        }
        core
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn is_target_attached(&self) -> bool {
        self.is_initialized() && self.shared.attached.load(Ordering::SeqCst)
    }
}

impl Compositor for ChannelCore {
    fn tier(&self) -> CompositorTier {
        self.tier
    }

    fn input_surface(&self) -> InputSurface {
        self.input.clone()
    }

    fn set_rotation(&self, degrees: i32) {
        let normalized = normalize_degrees(degrees);
        let previous = self.shared.rotation.swap(normalized, Ordering::AcqRel);
        if previous != normalized {
            debug!(channel = %self.label, rotation = normalized, "Rotation updated");
        }
    }

    fn rotation(&self) -> i32 {
        self.shared.rotation.load(Ordering::Acquire)
    }

    fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    fn capture_frame(&self, width: u32, height: u32) -> Option<RgbaImage> {
        if !self.is_initialized() || width == 0 || height == 0 {
            return None;
        }
        let thread = self.thread.as_ref()?;

        let result = thread.call(CAPTURE_TIMEOUT, move |state| state.capture(width, height));
        let mut rows = match result {
            Some(Ok(rows)) => rows,
            Some(Err(e)) => {
                debug!(channel = %self.label, error = %e, "Frame capture failed");
                return None;
            }
            None => {
                warn!(channel = %self.label, timeout_ms = CAPTURE_TIMEOUT.as_millis() as u64, "Frame capture timed out");
                return None;
            }
        };
        // Readback is bottom-up
        flip_vertical(&mut rows, width as usize * 4);
        RgbaImage::from_raw(width, height, rows)
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.input.clear_listener();
        self.shared.initialized.store(false, Ordering::SeqCst);
        self.shared.attached.store(false, Ordering::SeqCst);
        if let Some(thread) = &self.thread
            && !thread.shutdown(RELEASE_TIMEOUT)
        {
            warn!(channel = %self.label, "Compositor release timed out");
        }
        info!(channel = %self.label, frames = self.frames_drawn(), "Compositor released");
    }

    fn frames_drawn(&self) -> u64 {
        self.shared.frames_drawn.load(Ordering::Relaxed)
    }

    fn is_attached(&self) -> bool {
        self.is_target_attached()
    }
}

impl Drop for ChannelCore {
    fn drop(&mut self) {
        self.release();
    }
}

/// Implement [`Compositor`] for a newtype wrapping a `ChannelCore` in `.core`
macro_rules! delegate_compositor {
    ($channel:ty) => {
        impl $crate::backends::compositor::Compositor for $channel {
            fn tier(&self) -> $crate::backends::compositor::CompositorTier {
                self.core.tier()
            }

            fn input_surface(&self) -> $crate::backends::compositor::InputSurface {
                self.core.input_surface()
            }

            fn set_rotation(&self, degrees: i32) {
                self.core.set_rotation(degrees)
            }

            fn rotation(&self) -> i32 {
                self.core.rotation()
            }

            fn is_initialized(&self) -> bool {
                self.core.is_initialized()
            }

            fn capture_frame(&self, width: u32, height: u32) -> Option<::image::RgbaImage> {
                self.core.capture_frame(width, height)
            }

            fn release(&self) {
                self.core.release()
            }

            fn frames_drawn(&self) -> u64 {
                self.core.frames_drawn()
            }

            fn is_attached(&self) -> bool {
                self.core.is_attached()
            }
        }
    };
}

pub(crate) use delegate_compositor;
