// SPDX-License-Identifier: MPL-2.0

//! Single-callback camera path
//!
//! Older hosts drive the camera through one object: a preview display, a
//! continuous preview-frame callback filling host-owned buffers, and a still
//! capture answered through a JPEG callback. Preview display playback goes
//! through the shared orchestrator; the frame callback has its own decoder
//! whose latest frame is converted to NV21 on demand.

use super::platform::{PictureCallback, PictureCallbacks, PlatformCamera, ShutterCallback};
use super::surface::TargetSurface;
use super::targets::TargetRole;
use super::SessionContext;
use crate::constants::media::SAMPLE_TIMEOUT;
use crate::media::frame::copy_clamped;
use crate::media::{FnSink, MediaPlayer, Nv21Frame, VideoFrame};
use crate::pipelines::playback::OutputTier;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Latest decoded frame with a wakeup for the first one
#[derive(Default)]
struct LatestFrame {
    frame: Mutex<Option<VideoFrame>>,
    ready: Condvar,
}

impl LatestFrame {
    fn publish(&self, frame: VideoFrame) {
        if let Ok(mut latest) = self.frame.lock() {
            *latest = Some(frame);
            self.ready.notify_all();
        }
    }

    fn wait(&self) -> Option<VideoFrame> {
        let deadline = Instant::now() + SAMPLE_TIMEOUT;
        let mut latest = self.frame.lock().ok()?;
        while latest.is_none() {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, timeout) = self.ready.wait_timeout(latest, remaining).ok()?;
            latest = guard;
            if timeout.timed_out() && latest.is_none() {
                return None;
            }
        }
        latest.clone()
    }
}

#[derive(Default)]
struct FrameCallbackState {
    preview_size: Option<(u32, u32)>,
    buffers: VecDeque<Vec<u8>>,
    decoder: Option<Box<dyn MediaPlayer>>,
    /// Set when the decoder could not start; cleared by release
    decoder_failed: bool,
}

pub struct LegacyCamera {
    ctx: Arc<SessionContext>,
    platform: Arc<dyn PlatformCamera>,
    latest: Arc<LatestFrame>,
    state: Mutex<FrameCallbackState>,
}

impl LegacyCamera {
    /// Open the device; resets all per-device state
    pub fn open(ctx: Arc<SessionContext>, platform: Arc<dyn PlatformCamera>) -> Self {
        ctx.device_opened();
        info!("Legacy camera opened");
        Self {
            ctx,
            platform,
            latest: Arc::new(LatestFrame::default()),
            state: Mutex::new(FrameCallbackState::default()),
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Preview size declared by the host
    pub fn set_preview_size(&self, width: u32, height: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.preview_size = Some((width, height));
        }
    }

    pub fn preview_size(&self) -> Option<(u32, u32)> {
        self.state.lock().ok().and_then(|s| s.preview_size)
    }

    /// Route substitute playback to the host's preview display
    pub fn set_preview_display(&self, target: Arc<dyn TargetSurface>) -> Option<OutputTier> {
        if !self.ctx.intercepting("legacy_preview") {
            return None;
        }
        self.ctx
            .playback()
            .start_for_target(TargetRole::PreviewPrimary, target)
    }

    /// Hand a buffer to the frame callback path
    pub fn add_callback_buffer(&self, buffer: Vec<u8>) {
        if let Ok(mut state) = self.state.lock() {
            state.buffers.push_back(buffer);
        }
    }

    /// Fill the next host buffer and return it, as the frame callback would
    pub fn deliver_preview_frame(&self) -> Option<Vec<u8>> {
        let mut buffer = self.state.lock().ok()?.buffers.pop_front()?;
        self.on_preview_frame(&mut buffer);
        Some(buffer)
    }

    /// Overwrite a host preview buffer with the latest substitute frame
    ///
    /// Returns the number of bytes copied; zero leaves the buffer untouched.
    pub fn on_preview_frame(&self, buffer: &mut [u8]) -> usize {
        if !self.ctx.intercepting("legacy_frame") {
            return 0;
        }
        let Some(size) = self.ensure_decoder() else {
            return 0;
        };
        let Some(frame) = self.latest.wait() else {
            debug!("No substitute frame yet");
            return 0;
        };
        let (width, height) = size.unwrap_or((frame.width, frame.height));
        let Some(nv21) = Nv21Frame::from_rgba(&frame, width, height) else {
            return 0;
        };
        let copied = copy_clamped(buffer, &nv21.data);
        if copied < nv21.data.len() {
            debug!(copied, frame = nv21.data.len(), "Preview buffer smaller than frame");
        }
        self.ctx.raw_frames().store(nv21);
        copied
    }

    /// Start the frame-callback decoder on first use
    ///
    /// A failed start is not retried until the camera is released.
    fn ensure_decoder(&self) -> Option<Option<(u32, u32)>> {
        let mut state = self.state.lock().ok()?;
        if state.decoder.is_some() {
            return Some(state.preview_size);
        }
        if state.decoder_failed {
            return None;
        }

        let Some(source) = self.ctx.media().open() else {
            debug!("No substitute media for the frame callback");
            return None;
        };
        let mut player = self.ctx.players().create("frame-callback");
        player.set_muted(true);
        player.set_looping(true);
        let latest = Arc::clone(&self.latest);
        let started = player
            .set_source(source)
            .and_then(|()| player.prepare())
            .and_then(|()| {
                player.set_output(Arc::new(FnSink(move |frame| latest.publish(frame))));
                player.start()
            });
        if let Err(e) = started {
            warn!(error = %e, "Frame callback decoder failed, preview frames left untouched");
            player.release();
            state.decoder_failed = true;
            return None;
        }
        info!(size = ?state.preview_size, "Frame callback decoder started");
        state.decoder = Some(player);
        Some(state.preview_size)
    }

    /// Still capture with shutter, raw and JPEG callbacks
    pub fn take_picture(
        &self,
        shutter: Option<ShutterCallback>,
        raw: Option<PictureCallback>,
        jpeg: Option<PictureCallback>,
    ) {
        self.capture(PictureCallbacks {
            shutter,
            raw,
            postview: None,
            jpeg,
        });
    }

    /// Still capture with an additional postview callback
    pub fn take_picture_with_postview(
        &self,
        shutter: Option<ShutterCallback>,
        raw: Option<PictureCallback>,
        postview: Option<PictureCallback>,
        jpeg: Option<PictureCallback>,
    ) {
        self.capture(PictureCallbacks {
            shutter,
            raw,
            postview,
            jpeg,
        });
    }

    fn capture(&self, callbacks: PictureCallbacks) {
        let config = self.ctx.config();
        if config.disable_module() || !config.enable_photo_fake() {
            if let Err(e) = self.platform.take_picture(callbacks) {
                warn!(error = %e, "Forwarded still capture failed");
            }
            return;
        }

        let photo = self.ctx.photo();
        photo.suppress();
        info!("Still capture suppressed");
        let data = match photo.produce_legacy(self.preview_size()) {
            Ok(encoded) => encoded.data,
            Err(e) => {
                warn!(error = %e, "Replacement photo failed");
                Vec::new()
            }
        };
        if let Some(jpeg) = callbacks.jpeg {
            jpeg(data);
        }
    }

    /// Stop the frame decoder and tear down device state
    pub fn release(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(mut decoder) = state.decoder.take() {
                decoder.stop();
                decoder.release();
            }
            state.buffers.clear();
            state.decoder_failed = false;
        }
        if let Ok(mut latest) = self.latest.frame.lock() {
            *latest = None;
        }
        self.ctx.device_closed();
        info!("Legacy camera released");
    }
}

impl Drop for LegacyCamera {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut()
            && let Some(mut decoder) = state.decoder.take()
        {
            decoder.release();
        }
    }
}
