// SPDX-License-Identifier: MPL-2.0

//! The underlying camera platform receiving forwarded calls
//!
//! [`SimulatedPlatform`] stands in for real hardware: it records exactly what
//! the interception layer forwards and answers the way a camera would, so the
//! effect of interception can be observed from the outside.

use super::request::{CaptureRequest, RequestTemplate};
use super::session::{CaptureSession, ExecutorRef, SessionArgs, SessionShape, SessionType};
use super::surface::SurfaceId;
use crate::constants::JpegQuality;
use crate::errors::CaptureError;
use crate::media::VideoFrame;
use crate::pipelines::photo::{Image, ImageFormat, encode_jpeg};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info};

pub type ShutterCallback = Box<dyn FnOnce() + Send>;
pub type PictureCallback = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Callbacks of a single-callback still capture
#[derive(Default)]
pub struct PictureCallbacks {
    pub shutter: Option<ShutterCallback>,
    pub raw: Option<PictureCallback>,
    pub postview: Option<PictureCallback>,
    pub jpeg: Option<PictureCallback>,
}

/// Camera platform calls the interception layer forwards to
pub trait PlatformCamera: Send + Sync {
    /// API level; decides which session shapes exist
    fn platform_level(&self) -> u32;

    fn create_session(
        &self,
        shape: SessionShape,
        args: SessionArgs,
    ) -> Result<CaptureSession, CaptureError>;

    /// Submit a finalized request to the hardware
    fn submit(&self, request: &CaptureRequest) -> Result<(), CaptureError>;

    /// Hardware still capture of the single-callback API
    fn take_picture(&self, callbacks: PictureCallbacks) -> Result<(), CaptureError>;
}

/// What a forwarded session-creation call carried
#[derive(Debug, Clone)]
pub struct ForwardedSession {
    pub shape: SessionShape,
    pub target_ids: Vec<SurfaceId>,
    pub session_type: Option<SessionType>,
    pub executor: Option<ExecutorRef>,
    pub session: CaptureSession,
}

/// Camera without hardware
///
/// Configures every session immediately through the supplied callback. A
/// still-capture request delivers a gray JPEG into every reader target it
/// names; any other target receives a gray preview frame.
pub struct SimulatedPlatform {
    level: u32,
    next_session: AtomicU64,
    fail_configure: AtomicBool,
    sessions: Mutex<Vec<ForwardedSession>>,
    requests: Mutex<Vec<CaptureRequest>>,
    real_captures: AtomicU64,
}

const GRAY: u8 = 128;

impl SimulatedPlatform {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            next_session: AtomicU64::new(1),
            fail_configure: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            real_captures: AtomicU64::new(0),
        }
    }

    /// Report configuration failure for subsequent sessions
    pub fn set_fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::SeqCst);
    }

    pub fn sessions(&self) -> Vec<ForwardedSession> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Captures served by the (simulated) hardware
    pub fn real_captures(&self) -> u64 {
        self.real_captures.load(Ordering::SeqCst)
    }

    fn real_jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width.max(1), height.max(1), image::Rgb([GRAY; 3]));
        encode_jpeg(&image, JpegQuality::Full).unwrap_or_default()
    }
}

impl PlatformCamera for SimulatedPlatform {
    fn platform_level(&self) -> u32 {
        self.level
    }

    fn create_session(
        &self,
        shape: SessionShape,
        args: SessionArgs,
    ) -> Result<CaptureSession, CaptureError> {
        let session = CaptureSession {
            id: self.next_session.fetch_add(1, Ordering::SeqCst),
            outputs: args.target_ids(),
        };
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(ForwardedSession {
                shape,
                target_ids: session.outputs.clone(),
                session_type: args.session_type(),
                executor: args.executor(),
                session: session.clone(),
            });
        }
        debug!(?shape, session = session.id, outputs = session.outputs.len(), "Platform session created");

        if let Some(callback) = args.callback() {
            if self.fail_configure.load(Ordering::SeqCst) {
                callback.on_configure_failed(&session);
            } else {
                callback.on_configured(&session);
            }
        }
        Ok(session)
    }

    fn submit(&self, request: &CaptureRequest) -> Result<(), CaptureError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        for target in &request.targets {
            let (width, height) = target.size();
            match target.image_queue() {
                Some(queue) if request.template == RequestTemplate::StillCapture => {
                    self.real_captures.fetch_add(1, Ordering::SeqCst);
                    let (w, h) = queue.size();
                    let image = Image {
                        width: w,
                        height: h,
                        format: ImageFormat::Jpeg,
                        planes: vec![Self::real_jpeg(w, h)],
                        timestamp: SystemTime::now(),
                    };
                    if let Err(e) = queue.deliver(image) {
                        debug!(error = %e, "Platform image dropped");
                    }
                }
                Some(_) => {}
                None => {
                    let frame = VideoFrame::solid(width.max(1), height.max(1), [GRAY, GRAY, GRAY, 255], 0);
                    if let Err(e) = target.queue_frame(frame) {
                        debug!(error = %e, "Platform frame dropped");
                    }
                }
            }
        }
        Ok(())
    }

    fn take_picture(&self, callbacks: PictureCallbacks) -> Result<(), CaptureError> {
        self.real_captures.fetch_add(1, Ordering::SeqCst);
        info!("Platform still capture");
        if let Some(shutter) = callbacks.shutter {
            shutter();
        }
        if let Some(jpeg) = callbacks.jpeg {
            jpeg(Self::real_jpeg(64, 48));
        }
        Ok(())
    }
}
