// SPDX-License-Identifier: MPL-2.0

//! Session lifecycle and session-creation call shapes
//!
//! Hosts can create a capture session through six call shapes. They differ
//! only in where the target list sits and whether it is wrapped in a
//! configuration object, so each shape is described by a [`SessionVariant`]
//! and one rewrite routine handles all of them.

use super::surface::{SurfaceId, TargetSurface};
use crate::constants::platform::{
    LEVEL_OUTPUT_CONFIGURATIONS, LEVEL_REPROCESSABLE, LEVEL_SESSION_CONFIGURATION,
    LEVEL_SURFACE_LIST,
};
use crate::errors::CaptureError;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Per-device session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Opening,
    Configuring,
    Active,
    Error,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Configuring => "configuring",
            SessionState::Active => "active",
            SessionState::Error => "error",
        }
    }

    pub fn can_transition(&self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (_, Closed)
                | (Closed | Error, Opening)
                | (Opening | Active | Configuring, Configuring)
                | (Configuring, Active)
                | (Opening | Configuring, Error)
        )
    }

    /// Checked transition
    pub fn transition(&self, to: SessionState) -> Result<SessionState, CaptureError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(CaptureError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            })
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Session-creation call shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionShape {
    /// `(targets, callback, handler)`
    SurfaceList,
    /// `(output configurations, callback, handler)`
    OutputConfigurations,
    /// `(targets, callback, handler)` for high frame rate sessions
    ConstrainedHighSpeed,
    /// `(input configuration, targets, callback, handler)`
    Reprocessable,
    /// `(input configuration, output configurations, callback, handler)`
    ReprocessableByConfigurations,
    /// `(session configuration)`
    SessionConfiguration,
}

/// Kind of value at a variant's target position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArgKind {
    Surfaces,
    OutputConfigurations,
    SessionConfiguration,
}

impl TargetArgKind {
    fn name(&self) -> &'static str {
        match self {
            TargetArgKind::Surfaces => "target list",
            TargetArgKind::OutputConfigurations => "output configuration list",
            TargetArgKind::SessionConfiguration => "session configuration",
        }
    }
}

/// Data description of one session-creation shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionVariant {
    pub shape: SessionShape,
    /// Argument position holding the targets
    pub targets_arg: usize,
    pub target_kind: TargetArgKind,
    /// Session type, executor and callback are carried into a new wrapper
    pub keeps_wrapper: bool,
    /// Lowest platform level exposing this shape
    pub min_platform_level: u32,
}

impl SessionVariant {
    pub const ALL: [SessionVariant; 6] = [
        SessionVariant {
            shape: SessionShape::SurfaceList,
            targets_arg: 0,
            target_kind: TargetArgKind::Surfaces,
            keeps_wrapper: false,
            min_platform_level: LEVEL_SURFACE_LIST,
        },
        SessionVariant {
            shape: SessionShape::OutputConfigurations,
            targets_arg: 0,
            target_kind: TargetArgKind::OutputConfigurations,
            keeps_wrapper: false,
            min_platform_level: LEVEL_OUTPUT_CONFIGURATIONS,
        },
        SessionVariant {
            shape: SessionShape::ConstrainedHighSpeed,
            targets_arg: 0,
            target_kind: TargetArgKind::Surfaces,
            keeps_wrapper: false,
            min_platform_level: LEVEL_SURFACE_LIST,
        },
        SessionVariant {
            shape: SessionShape::Reprocessable,
            targets_arg: 1,
            target_kind: TargetArgKind::Surfaces,
            keeps_wrapper: false,
            min_platform_level: LEVEL_REPROCESSABLE,
        },
        SessionVariant {
            shape: SessionShape::ReprocessableByConfigurations,
            targets_arg: 1,
            target_kind: TargetArgKind::OutputConfigurations,
            keeps_wrapper: false,
            min_platform_level: LEVEL_OUTPUT_CONFIGURATIONS,
        },
        SessionVariant {
            shape: SessionShape::SessionConfiguration,
            targets_arg: 0,
            target_kind: TargetArgKind::SessionConfiguration,
            keeps_wrapper: true,
            min_platform_level: LEVEL_SESSION_CONFIGURATION,
        },
    ];

    pub fn of(shape: SessionShape) -> &'static SessionVariant {
        // ALL covers every shape exactly once
        match shape {
            SessionShape::SurfaceList => &Self::ALL[0],
            SessionShape::OutputConfigurations => &Self::ALL[1],
            SessionShape::ConstrainedHighSpeed => &Self::ALL[2],
            SessionShape::Reprocessable => &Self::ALL[3],
            SessionShape::ReprocessableByConfigurations => &Self::ALL[4],
            SessionShape::SessionConfiguration => &Self::ALL[5],
        }
    }
}

/// One output stream of a session
#[derive(Clone)]
pub struct OutputConfiguration {
    surfaces: Vec<Arc<dyn TargetSurface>>,
}

impl OutputConfiguration {
    pub fn new(surface: Arc<dyn TargetSurface>) -> Self {
        Self {
            surfaces: vec![surface],
        }
    }

    pub fn add_surface(&mut self, surface: Arc<dyn TargetSurface>) {
        self.surfaces.push(surface);
    }

    pub fn surfaces(&self) -> &[Arc<dyn TargetSurface>] {
        &self.surfaces
    }
}

/// Reprocessing input stream description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConfiguration {
    pub width: u32,
    pub height: u32,
    pub format: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Regular,
    HighSpeed,
}

/// Opaque executor the host wants callbacks dispatched on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorRef(pub String);

/// Single-object session description
#[derive(Clone)]
pub struct SessionConfiguration {
    pub session_type: SessionType,
    pub outputs: Vec<OutputConfiguration>,
    pub executor: ExecutorRef,
    pub callback: Arc<dyn SessionCallback>,
}

/// A configured capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    pub id: u64,
    pub outputs: Vec<SurfaceId>,
}

/// Host's session state callback
pub trait SessionCallback: Send + Sync {
    fn on_configured(&self, session: &CaptureSession);

    fn on_configure_failed(&self, session: &CaptureSession);

    fn on_closed(&self, _session: &CaptureSession) {}
}

/// One argument of a session-creation call
#[derive(Clone)]
pub enum SessionArg {
    Surfaces(Vec<Arc<dyn TargetSurface>>),
    OutputConfigurations(Vec<OutputConfiguration>),
    Input(InputConfiguration),
    Callback(Arc<dyn SessionCallback>),
    /// Callback thread; `None` means the caller's thread
    Handler(Option<String>),
    Configuration(SessionConfiguration),
}

impl SessionArg {
    fn surface_ids(&self) -> Vec<SurfaceId> {
        let from_outputs = |outputs: &[OutputConfiguration]| {
            outputs
                .iter()
                .flat_map(|o| o.surfaces().iter().map(|s| s.id()))
                .collect::<Vec<_>>()
        };
        match self {
            SessionArg::Surfaces(targets) => targets.iter().map(|t| t.id()).collect(),
            SessionArg::OutputConfigurations(outputs) => from_outputs(outputs),
            SessionArg::Configuration(config) => from_outputs(&config.outputs),
            _ => Vec::new(),
        }
    }

    fn is_empty_target(&self) -> bool {
        match self {
            SessionArg::Surfaces(targets) => targets.is_empty(),
            SessionArg::OutputConfigurations(outputs) => outputs.is_empty(),
            _ => false,
        }
    }
}

/// Argument list of a session-creation call
#[derive(Clone)]
pub struct SessionArgs(pub Vec<SessionArg>);

impl SessionArgs {
    /// Arguments for `SurfaceList` or `ConstrainedHighSpeed`
    pub fn surfaces(targets: Vec<Arc<dyn TargetSurface>>, callback: Arc<dyn SessionCallback>) -> Self {
        Self(vec![
            SessionArg::Surfaces(targets),
            SessionArg::Callback(callback),
            SessionArg::Handler(None),
        ])
    }

    pub fn output_configurations(
        outputs: Vec<OutputConfiguration>,
        callback: Arc<dyn SessionCallback>,
    ) -> Self {
        Self(vec![
            SessionArg::OutputConfigurations(outputs),
            SessionArg::Callback(callback),
            SessionArg::Handler(None),
        ])
    }

    pub fn reprocessable(
        input: InputConfiguration,
        targets: Vec<Arc<dyn TargetSurface>>,
        callback: Arc<dyn SessionCallback>,
    ) -> Self {
        Self(vec![
            SessionArg::Input(input),
            SessionArg::Surfaces(targets),
            SessionArg::Callback(callback),
            SessionArg::Handler(None),
        ])
    }

    pub fn reprocessable_by_configurations(
        input: InputConfiguration,
        outputs: Vec<OutputConfiguration>,
        callback: Arc<dyn SessionCallback>,
    ) -> Self {
        Self(vec![
            SessionArg::Input(input),
            SessionArg::OutputConfigurations(outputs),
            SessionArg::Callback(callback),
            SessionArg::Handler(None),
        ])
    }

    pub fn configuration(config: SessionConfiguration) -> Self {
        Self(vec![SessionArg::Configuration(config)])
    }

    /// Every surface the call would hand to the platform
    pub fn target_ids(&self) -> Vec<SurfaceId> {
        self.0.iter().flat_map(SessionArg::surface_ids).collect()
    }

    /// The session callback, wherever the shape carries it
    pub fn callback(&self) -> Option<Arc<dyn SessionCallback>> {
        self.0.iter().find_map(|arg| match arg {
            SessionArg::Callback(cb) => Some(Arc::clone(cb)),
            SessionArg::Configuration(config) => Some(Arc::clone(&config.callback)),
            _ => None,
        })
    }

    /// Session type, if the call carries a configuration object
    pub fn session_type(&self) -> Option<SessionType> {
        self.0.iter().find_map(|arg| match arg {
            SessionArg::Configuration(config) => Some(config.session_type),
            _ => None,
        })
    }

    pub fn executor(&self) -> Option<ExecutorRef> {
        self.0.iter().find_map(|arg| match arg {
            SessionArg::Configuration(config) => Some(config.executor.clone()),
            _ => None,
        })
    }
}

/// Receives session events from wrapped callbacks
pub trait SessionObserver: Send + Sync {
    fn session_configured(&self, shape: SessionShape, session: &CaptureSession);

    fn session_configure_failed(&self, shape: SessionShape, session: &CaptureSession);

    fn session_closed(&self, shape: SessionShape, session: &CaptureSession);
}

/// Host callback wrapper that observes and forwards, never alters
pub struct ObservedSessionCallback {
    inner: Arc<dyn SessionCallback>,
    observer: Weak<dyn SessionObserver>,
    shape: SessionShape,
}

impl ObservedSessionCallback {
    pub fn wrap(
        inner: Arc<dyn SessionCallback>,
        observer: Weak<dyn SessionObserver>,
        shape: SessionShape,
    ) -> Arc<dyn SessionCallback> {
        Arc::new(Self {
            inner,
            observer,
            shape,
        })
    }
}

impl SessionCallback for ObservedSessionCallback {
    fn on_configured(&self, session: &CaptureSession) {
        info!(shape = ?self.shape, session = session.id, "Session configured");
        if let Some(observer) = self.observer.upgrade() {
            observer.session_configured(self.shape, session);
        }
        self.inner.on_configured(session);
    }

    fn on_configure_failed(&self, session: &CaptureSession) {
        warn!(shape = ?self.shape, session = session.id, "Session configuration failed");
        if let Some(observer) = self.observer.upgrade() {
            observer.session_configure_failed(self.shape, session);
        }
        self.inner.on_configure_failed(session);
    }

    fn on_closed(&self, session: &CaptureSession) {
        info!(shape = ?self.shape, session = session.id, "Session closed");
        if let Some(observer) = self.observer.upgrade() {
            observer.session_closed(self.shape, session);
        }
        self.inner.on_closed(session);
    }
}

fn kind_matches(kind: TargetArgKind, arg: &SessionArg) -> bool {
    matches!(
        (kind, arg),
        (TargetArgKind::Surfaces, SessionArg::Surfaces(_))
            | (TargetArgKind::OutputConfigurations, SessionArg::OutputConfigurations(_))
            | (TargetArgKind::SessionConfiguration, SessionArg::Configuration(_))
    )
}

/// Replace the targets of a call with the sink and wrap its callback
///
/// A call whose target position holds an empty list is returned unchanged.
pub fn rewrite_session_args(
    variant: &SessionVariant,
    args: SessionArgs,
    sink: Arc<dyn TargetSurface>,
    observer: Weak<dyn SessionObserver>,
) -> Result<SessionArgs, CaptureError> {
    let target = args
        .0
        .get(variant.targets_arg)
        .ok_or(CaptureError::UnexpectedArgument {
            index: variant.targets_arg,
            expected: variant.target_kind.name(),
        })?;
    if !kind_matches(variant.target_kind, target) {
        return Err(CaptureError::UnexpectedArgument {
            index: variant.targets_arg,
            expected: variant.target_kind.name(),
        });
    }
    if target.is_empty_target() {
        debug!(shape = ?variant.shape, "Session call without targets left unchanged");
        return Ok(args);
    }

    let rewritten = args
        .0
        .into_iter()
        .enumerate()
        .map(|(index, arg)| {
            let at_target = index == variant.targets_arg
                || (variant.keeps_wrapper && matches!(arg, SessionArg::Configuration(_)));
            if at_target || matches!(arg, SessionArg::Callback(_)) {
                substitute(arg, &sink, &observer, variant.shape)
            } else {
                arg
            }
        })
        .collect();

    Ok(SessionArgs(rewritten))
}

/// Replace every target-bearing argument with the sink, whatever its position
///
/// Used when a call does not match its shape's layout. Host targets are never
/// left in the returned arguments.
pub fn sink_only_args(
    shape: SessionShape,
    args: SessionArgs,
    sink: Arc<dyn TargetSurface>,
    observer: Weak<dyn SessionObserver>,
) -> SessionArgs {
    SessionArgs(
        args.0
            .into_iter()
            .map(|arg| substitute(arg, &sink, &observer, shape))
            .collect(),
    )
}

fn substitute(
    arg: SessionArg,
    sink: &Arc<dyn TargetSurface>,
    observer: &Weak<dyn SessionObserver>,
    shape: SessionShape,
) -> SessionArg {
    let wrap = |cb: Arc<dyn SessionCallback>| {
        ObservedSessionCallback::wrap(cb, observer.clone(), shape)
    };
    match arg {
        SessionArg::Surfaces(targets) if !targets.is_empty() => {
            SessionArg::Surfaces(vec![Arc::clone(sink)])
        }
        SessionArg::OutputConfigurations(outputs) if !outputs.is_empty() => {
            SessionArg::OutputConfigurations(vec![OutputConfiguration::new(Arc::clone(sink))])
        }
        SessionArg::Configuration(config) => SessionArg::Configuration(SessionConfiguration {
            session_type: config.session_type,
            outputs: vec![OutputConfiguration::new(Arc::clone(sink))],
            executor: config.executor,
            callback: wrap(config.callback),
        }),
        SessionArg::Callback(cb) => SessionArg::Callback(wrap(cb)),
        other => other,
    }
}

/// Variants interception was installed for on this platform
#[derive(Debug, Clone, Default)]
pub struct InstalledInterceptors {
    variants: Vec<&'static SessionVariant>,
}

impl InstalledInterceptors {
    pub fn variant(&self, shape: SessionShape) -> Option<&'static SessionVariant> {
        self.variants.iter().copied().find(|v| v.shape == shape)
    }

    pub fn is_installed(&self, shape: SessionShape) -> bool {
        self.variant(shape).is_some()
    }

    pub fn shapes(&self) -> Vec<SessionShape> {
        self.variants.iter().map(|v| v.shape).collect()
    }
}

/// Install each session variant independently
///
/// A variant the platform does not expose is skipped; the others are
/// unaffected and calls of a skipped shape pass through unmodified.
pub fn install_session_interceptors(platform_level: u32) -> InstalledInterceptors {
    let mut installed = InstalledInterceptors::default();
    for variant in &SessionVariant::ALL {
        if platform_level < variant.min_platform_level {
            debug!(
                shape = ?variant.shape,
                required = variant.min_platform_level,
                platform_level,
                "Session shape unavailable, not intercepted"
            );
            continue;
        }
        installed.variants.push(variant);
    }
    info!(count = installed.variants.len(), platform_level, "Session interceptors installed");
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::capture::surface::{HeadlessSurface, VirtualSink};
    use std::sync::Mutex;

    struct NullCallback;

    impl SessionCallback for NullCallback {
        fn on_configured(&self, _: &CaptureSession) {}
        fn on_configure_failed(&self, _: &CaptureSession) {}
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl SessionObserver for Recorder {
        fn session_configured(&self, _: SessionShape, _: &CaptureSession) {
            self.0.lock().unwrap().push("configured");
        }
        fn session_configure_failed(&self, _: SessionShape, _: &CaptureSession) {
            self.0.lock().unwrap().push("failed");
        }
        fn session_closed(&self, _: SessionShape, _: &CaptureSession) {
            self.0.lock().unwrap().push("closed");
        }
    }

    #[test]
    fn test_state_transitions() {
        use SessionState::*;
        assert_eq!(Closed.transition(Opening), Ok(Opening));
        assert_eq!(Opening.transition(Configuring), Ok(Configuring));
        assert_eq!(Configuring.transition(Active), Ok(Active));
        assert_eq!(Active.transition(Closed), Ok(Closed));
        assert_eq!(Configuring.transition(Error), Ok(Error));
        assert!(Active.transition(Error).is_err());
        assert!(Closed.transition(Active).is_err());
        assert!(Opening.transition(Opening).is_err());
    }

    #[test]
    fn test_variants_cover_every_shape_once() {
        for variant in &SessionVariant::ALL {
            assert_eq!(SessionVariant::of(variant.shape), variant);
        }
    }

    #[test]
    fn test_install_respects_platform_level() {
        let old = install_session_interceptors(21);
        assert_eq!(
            old.shapes(),
            vec![SessionShape::SurfaceList, SessionShape::ConstrainedHighSpeed]
        );
        let new = install_session_interceptors(34);
        assert_eq!(new.shapes().len(), 6);
    }

    #[test]
    fn test_rewrite_keeps_configuration_metadata() {
        let sink = VirtualSink::new(1);
        let real = HeadlessSurface::preview("view", 4, 4);
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn SessionObserver> = recorder.clone();
        let config = SessionConfiguration {
            session_type: SessionType::HighSpeed,
            outputs: vec![OutputConfiguration::new(real.clone())],
            executor: ExecutorRef("main".into()),
            callback: Arc::new(NullCallback),
        };
        let args = SessionArgs::configuration(config);
        let rewritten = rewrite_session_args(
            SessionVariant::of(SessionShape::SessionConfiguration),
            args,
            sink.clone(),
            Arc::downgrade(&observer),
        )
        .unwrap();

        assert_eq!(rewritten.target_ids(), vec![sink.id()]);
        assert_eq!(rewritten.session_type(), Some(SessionType::HighSpeed));
        assert_eq!(rewritten.executor(), Some(ExecutorRef("main".into())));

        let session = CaptureSession {
            id: 1,
            outputs: vec![sink.id()],
        };
        rewritten.callback().unwrap().on_configured(&session);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["configured"]);
    }

    #[test]
    fn test_rewrite_rejects_wrong_argument_kind() {
        let sink = VirtualSink::new(1);
        let recorder: Arc<dyn SessionObserver> = Arc::new(Recorder::default());
        let args = SessionArgs::surfaces(
            vec![HeadlessSurface::preview("view", 4, 4)],
            Arc::new(NullCallback),
        );
        let result = rewrite_session_args(
            SessionVariant::of(SessionShape::Reprocessable),
            args,
            sink,
            Arc::downgrade(&recorder),
        );
        assert!(matches!(
            result,
            Err(CaptureError::UnexpectedArgument { index: 1, .. })
        ));
    }

    #[test]
    fn test_sink_only_args_drops_every_host_target() {
        let sink = VirtualSink::new(1);
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn SessionObserver> = recorder.clone();
        let real = HeadlessSurface::preview("view", 4, 4);
        let args = SessionArgs::surfaces(vec![real.clone()], Arc::new(NullCallback));

        let scrubbed = sink_only_args(
            SessionShape::Reprocessable,
            args,
            sink.clone(),
            Arc::downgrade(&observer),
        );
        assert_eq!(scrubbed.target_ids(), vec![sink.id()]);

        // The host callback is still observed
        let session = CaptureSession {
            id: 2,
            outputs: vec![sink.id()],
        };
        scrubbed.callback().unwrap().on_configure_failed(&session);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["failed"]);
    }
}
