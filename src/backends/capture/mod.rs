// SPDX-License-Identifier: MPL-2.0

//! Capture interception
//!
//! Sits between the host and the camera platform. Every output target the
//! host names is tracked by role and replaced by one [`VirtualSink`], so the
//! platform only ever produces into the sink while the real targets are fed
//! substitute media by the playback orchestrator.
//!
//! ```text
//!   host ──▶ CaptureInterceptor ──▶ PlatformCamera
//!                 │   (targets → VirtualSink)
//!                 ▼
//!          SessionContext
//!            ├─ TargetTable ──▶ PlaybackOrchestrator ──▶ real targets
//!            └─ PendingPhotoSlot ──▶ PhotoInjector ──▶ reader queues
//! ```
//!
//! All per-device state lives in one [`SessionContext`] shared by the session
//! and single-callback entry points. Entry points never fail because of the
//! virtualization: internal problems are logged and the host call completes.

pub mod legacy;
pub mod platform;
pub mod request;
pub mod session;
pub mod surface;
pub mod targets;

pub use legacy::LegacyCamera;
pub use platform::{
    ForwardedSession, PictureCallback, PictureCallbacks, PlatformCamera, ShutterCallback,
    SimulatedPlatform,
};
pub use request::{BuilderId, CaptureRequest, RequestBuilder, RequestTemplate};
pub use session::{
    CaptureSession, ExecutorRef, InputConfiguration, InstalledInterceptors,
    ObservedSessionCallback, OutputConfiguration, SessionArg, SessionArgs, SessionCallback,
    SessionConfiguration, SessionObserver, SessionShape, SessionState, SessionType,
    SessionVariant, install_session_interceptors, rewrite_session_args, sink_only_args,
};
pub use surface::{HeadlessSurface, ReaderSurface, SurfaceId, TargetSink, TargetSurface, VirtualSink};
pub use targets::{Registration, TargetRole, TargetTable};

use crate::backends::compositor::GraphicsBackend;
use crate::config::ConfigProvider;
use crate::constants::photo::INJECTION_DELAY;
use crate::errors::{AppError, AppResult, CaptureError};
use crate::media::{FrameSnapshotter, MediaSourceProvider, PlayerFactory};
use crate::notify::{Notices, Presenter};
use crate::pipelines::photo::{PendingPhotoSlot, PhotoInjector, RawFrameStore, default_sources};
use crate::pipelines::playback::PlaybackOrchestrator;
use crate::tasks::TaskRunner;
use crate::watcher::{ConfigWatcher, WatchHandle};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

const NO_MEDIA_NOTICE: &str = "No substitute video found, camera left untouched";

/// Everything a [`SessionContext`] is built from
pub struct Collaborators {
    pub config: Arc<dyn ConfigProvider>,
    pub media: Arc<dyn MediaSourceProvider>,
    pub presenter: Arc<dyn Presenter>,
    pub graphics: Arc<dyn GraphicsBackend>,
    pub players: Arc<dyn PlayerFactory>,
    pub snapshotter: Arc<dyn FrameSnapshotter>,
}

/// Per-device mutable state
struct DeviceState {
    table: TargetTable,
    sink: Option<Arc<VirtualSink>>,
    recreate_sink: bool,
    generation: u64,
    last_builder: Option<BuilderId>,
    first_build: bool,
    state: SessionState,
}

fn watch_settings(
    config: &Arc<dyn ConfigProvider>,
    playback: &Arc<PlaybackOrchestrator>,
    tasks: &TaskRunner,
) -> Option<WatchHandle> {
    config.settings_file()?;
    let watcher = Arc::new(ConfigWatcher::new(Arc::clone(config), Arc::clone(playback)));
    match watcher.spawn(tasks) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Settings edits will not reach live playback");
            None
        }
    }
}

/// Owner of all interception state for one camera device
pub struct SessionContext {
    config: Arc<dyn ConfigProvider>,
    media: Arc<dyn MediaSourceProvider>,
    players: Arc<dyn PlayerFactory>,
    notices: Notices,
    playback: Arc<PlaybackOrchestrator>,
    photo: Arc<PhotoInjector>,
    raw_frames: Arc<RawFrameStore>,
    pending_photo: PendingPhotoSlot,
    // Live settings edits; `None` for in-memory settings
    settings_watch: Option<WatchHandle>,
    tasks: TaskRunner,
    device: Mutex<DeviceState>,
}

impl SessionContext {
    pub fn new(collaborators: Collaborators) -> AppResult<Arc<Self>> {
        let Collaborators {
            config,
            media,
            presenter,
            graphics,
            players,
            snapshotter,
        } = collaborators;

        let tasks =
            TaskRunner::new().map_err(|e| AppError::Other(format!("task runtime: {}", e)))?;
        let playback = Arc::new(PlaybackOrchestrator::new(
            graphics,
            Arc::clone(&players),
            Arc::clone(&media),
            Arc::clone(&config),
        ));
        let raw_frames = Arc::new(RawFrameStore::new());
        let photo = Arc::new(PhotoInjector::new(default_sources(
            Arc::clone(&playback),
            Arc::clone(&raw_frames),
            Arc::clone(&media),
            snapshotter,
        )));
        let settings_watch = watch_settings(&config, &playback, &tasks);

        Ok(Arc::new(Self {
            notices: Notices::new(presenter, Arc::clone(&config)),
            config,
            media,
            players,
            playback,
            photo,
            raw_frames,
            pending_photo: PendingPhotoSlot::new(),
            settings_watch,
            tasks,
            device: Mutex::new(DeviceState {
                table: TargetTable::new(),
                sink: None,
                recreate_sink: true,
                generation: 0,
                last_builder: None,
                first_build: true,
                state: SessionState::Closed,
            }),
        }))
    }

    /// Whether settings file edits reach live playback
    pub fn watches_settings(&self) -> bool {
        self.settings_watch.is_some()
    }

    fn device(&self) -> Option<MutexGuard<'_, DeviceState>> {
        match self.device.lock() {
            Ok(device) => Some(device),
            Err(_) => {
                warn!("Device state poisoned");
                None
            }
        }
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    pub fn media(&self) -> &Arc<dyn MediaSourceProvider> {
        &self.media
    }

    pub fn players(&self) -> &Arc<dyn PlayerFactory> {
        &self.players
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn playback(&self) -> &Arc<PlaybackOrchestrator> {
        &self.playback
    }

    pub fn photo(&self) -> &Arc<PhotoInjector> {
        &self.photo
    }

    pub fn raw_frames(&self) -> &Arc<RawFrameStore> {
        &self.raw_frames
    }

    pub fn pending_photo(&self) -> &PendingPhotoSlot {
        &self.pending_photo
    }

    pub fn tasks(&self) -> &TaskRunner {
        &self.tasks
    }

    pub fn state(&self) -> SessionState {
        self.device().map_or(SessionState::Error, |d| d.state)
    }

    /// Copy of the tracked targets
    pub fn targets(&self) -> TargetTable {
        self.device().map(|d| d.table.clone()).unwrap_or_default()
    }

    /// The current virtual sink, recreated first when marked stale
    pub fn sink(&self) -> Option<Arc<VirtualSink>> {
        let mut device = self.device()?;
        if device.recreate_sink || device.sink.is_none() {
            if let Some(old) = device.sink.take() {
                old.release();
            }
            device.generation += 1;
            device.sink = Some(VirtualSink::new(device.generation));
            device.recreate_sink = false;
            debug!(generation = device.generation, "Virtual sink created");
        }
        device.sink.clone()
    }

    pub fn sink_generation(&self) -> u64 {
        self.device().map_or(0, |d| d.generation)
    }

    pub fn is_first_session_build(&self) -> bool {
        self.device().is_some_and(|d| d.first_build)
    }

    /// Move to `to`; an invalid transition is logged and ignored
    fn transition(&self, to: SessionState) -> SessionState {
        let Some(mut device) = self.device() else {
            return SessionState::Error;
        };
        match device.state.transition(to) {
            Ok(next) => {
                if next != device.state {
                    debug!(from = %device.state, to = %next, "Session state");
                }
                device.state = next;
            }
            Err(e) => warn!(error = %e, "Session state unchanged"),
        }
        device.state
    }

    /// Whether host calls should be rewritten right now
    ///
    /// Shows the missing-media notice once for `access_point` when media is absent.
    pub fn intercepting(&self, access_point: &'static str) -> bool {
        if self.config.disable_module() {
            return false;
        }
        if !self.media.is_available() {
            debug!(access_point, "No substitute media, passing through");
            self.notices.show_once(access_point, NO_MEDIA_NOTICE);
            return false;
        }
        true
    }

    /// Reset per-device state for a newly opened device
    pub(crate) fn device_opened(&self) {
        self.playback.release_targets_for_device_close();
        self.photo.release_writers();
        self.pending_photo.clear();
        self.raw_frames.clear();

        if let Some(mut device) = self.device() {
            if !matches!(device.state, SessionState::Closed | SessionState::Error) {
                debug!(from = %device.state, "Device reopened without close");
                device.state = SessionState::Closed;
            }
            device.recreate_sink = true;
            device.table.clear();
            device.last_builder = None;
            device.first_build = true;
        }
        self.transition(SessionState::Opening);
        if let Some(sink) = self.sink() {
            info!(generation = sink.generation(), "Device opened, virtual sink recreated");
        }
    }

    /// Tear down everything bound to the device
    pub(crate) fn device_closed(&self) {
        self.playback.release_targets_for_device_close();
        self.photo.release_writers();
        self.pending_photo.clear();
        if let Some(mut device) = self.device() {
            device.table.clear();
            device.last_builder = None;
        }
        self.transition(SessionState::Closed);
    }
}

impl SessionObserver for SessionContext {
    fn session_configured(&self, shape: SessionShape, session: &CaptureSession) {
        self.transition(SessionState::Active);
        let started = self.playback.start_missing(&self.targets());
        debug!(?shape, session = session.id, started, "Playback checked after configure");
    }

    fn session_configure_failed(&self, shape: SessionShape, session: &CaptureSession) {
        debug!(?shape, session = session.id, "Configure failure observed");
        self.transition(SessionState::Error);
    }

    fn session_closed(&self, shape: SessionShape, session: &CaptureSession) {
        debug!(?shape, session = session.id, "Session close observed");
    }
}

/// Host-facing entry points of the session-based camera API
pub struct CaptureInterceptor {
    ctx: Arc<SessionContext>,
    platform: Arc<dyn PlatformCamera>,
    installed: InstalledInterceptors,
}

impl CaptureInterceptor {
    pub fn new(ctx: Arc<SessionContext>, platform: Arc<dyn PlatformCamera>) -> Self {
        let installed = install_session_interceptors(platform.platform_level());
        Self {
            ctx,
            platform,
            installed,
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn installed(&self) -> &InstalledInterceptors {
        &self.installed
    }

    pub fn on_device_open(&self, device: &str) {
        info!(device, "Camera device opening");
        self.ctx.device_opened();
        if !self.ctx.config.disable_module() && !self.ctx.media.is_available() {
            self.ctx.notices.show_once("device_open", NO_MEDIA_NOTICE);
        }
    }

    pub fn on_device_close(&self) {
        info!("Camera device closed");
        self.ctx.device_closed();
    }

    pub fn on_device_error(&self, code: i32) {
        warn!(code, "Camera device error");
        let state = self.ctx.state();
        if matches!(state, SessionState::Opening | SessionState::Configuring) {
            self.ctx.transition(SessionState::Error);
            self.ctx.playback.release_targets_for_device_close();
            self.ctx.photo.release_writers();
            self.ctx.pending_photo.clear();
        } else {
            self.ctx.device_closed();
        }
    }

    pub fn on_device_disconnected(&self) {
        info!("Camera device disconnected");
        self.ctx.device_closed();
    }

    /// Create a capture session, substituting the virtual sink for its targets
    pub fn create_session(
        &self,
        shape: SessionShape,
        args: SessionArgs,
    ) -> Result<CaptureSession, CaptureError> {
        let Some(variant) = self.installed.variant(shape) else {
            debug!(?shape, "Session shape not intercepted");
            return self.platform.create_session(shape, args);
        };
        if !self.ctx.intercepting("create_session") {
            return self.platform.create_session(shape, args);
        }
        let Some(sink) = self.ctx.sink() else {
            return self.platform.create_session(shape, args);
        };

        self.ctx.transition(SessionState::Configuring);
        let ctx: Arc<dyn SessionObserver> = self.ctx.clone();
        let observer: Weak<dyn SessionObserver> = Arc::downgrade(&ctx);
        let original_targets = args.target_ids().len();
        let sink: Arc<dyn TargetSurface> = sink;
        let rewritten =
            rewrite_session_args(variant, args.clone(), Arc::clone(&sink), observer.clone());
        let args = match rewritten {
            Ok(rewritten) => {
                info!(?shape, original_targets, "Session targets replaced by virtual sink");
                rewritten
            }
            Err(e) => {
                warn!(?shape, error = %e, "Unexpected session arguments, forwarding sink only");
                sink_only_args(shape, args, sink, observer)
            }
        };

        let result = self.platform.create_session(shape, args);
        if let Err(e) = &result {
            warn!(?shape, error = %e, "Platform session creation failed");
            self.ctx.transition(SessionState::Error);
        }
        result
    }

    /// Route a host output target into the request builder
    pub fn add_target(&self, builder: &mut RequestBuilder, target: Arc<dyn TargetSurface>) {
        if !self.ctx.intercepting("add_target") {
            builder.push_target(target);
            return;
        }
        let Some(sink) = self.ctx.sink() else {
            builder.push_target(target);
            return;
        };
        if target.id() == sink.id() {
            return;
        }

        if self.ctx.config.enable_photo_fake() && target.image_queue().is_some() {
            debug!(target_surface = %target.describe(), "Reader target parked for photo injection");
            self.ctx.pending_photo.store(Arc::clone(&target));
        }

        if let Some(mut device) = self.ctx.device() {
            match device.table.register(Arc::clone(&target)) {
                Registration::Added(role) => {
                    info!(role = %role, target_surface = %target.describe(), "Target intercepted");
                }
                Registration::AlreadyTracked(_) => {}
                Registration::Ignored => {
                    debug!(target_surface = %target.describe(), "Target not tracked");
                }
            }
        }
        builder.push_target(sink);
    }

    /// Forget a host output target
    pub fn remove_target(&self, builder: &mut RequestBuilder, target: &Arc<dyn TargetSurface>) {
        builder.drop_target(target.id());
        if let Some(mut device) = self.ctx.device()
            && let Some(role) = device.table.remove(target.id())
        {
            debug!(role = %role, target_surface = %target.describe(), "Target removed");
        }
    }

    /// Finalize a request
    ///
    /// The first build of each builder schedules a pending photo injection and
    /// restarts playback; repeated builds of the same builder have no effects.
    pub fn build(&self, builder: &RequestBuilder) -> CaptureRequest {
        let request = builder.to_request();
        if !self.ctx.intercepting("build") {
            return request;
        }

        let table = {
            let Some(mut device) = self.ctx.device() else {
                return request;
            };
            if device.last_builder == Some(builder.id()) {
                return request;
            }
            device.last_builder = Some(builder.id());
            if device.first_build {
                debug!(builder = ?builder.id(), "First build of the session");
                device.first_build = false;
            }
            device.table.clone()
        };

        if self.ctx.config.enable_photo_fake()
            && let Some(target) = self.ctx.pending_photo.take()
        {
            self.ctx.photo.suppress();
            info!(target_surface = %target.describe(), "Still capture suppressed, injection scheduled");
            let photo = Arc::clone(&self.ctx.photo);
            self.ctx
                .tasks
                .run_after(INJECTION_DELAY, "photo-injection", move || {
                    // Outcome is logged and counted by the injector
                    let _ = photo.inject(target.as_ref());
                });
        }

        self.ctx.playback.start_all(&table);
        request
    }

    /// Submit a finalized request to the platform
    pub fn capture(&self, request: &CaptureRequest) -> Result<(), CaptureError> {
        self.platform.submit(request)
    }
}
