// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests of camera interception, playback and photo injection

mod common;

use camswap::backends::capture::{
    ExecutorRef, HeadlessSurface, InputConfiguration, LegacyCamera, OutputConfiguration,
    ReaderSurface, RequestBuilder, RequestTemplate, SessionArgs, SessionCallback,
    SessionConfiguration, SessionShape, SessionState, SessionType, TargetRole, TargetSurface,
};
use camswap::backends::compositor::{Compositor, CompositorTier, RelayChannel, SoftwareBackend};
use camswap::media::FrameSink;
use camswap::pipelines::photo::PhotoState;
use camswap::pipelines::playback::OutputTier;
use camswap::watcher::ConfigWatcher;
use camswap::Config;
use common::{
    BLUE, CountingCallback, FixedMedia, HarnessBuilder, RED, ScriptedPlayerFactory, harness,
    split_frame, wait_for,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, mpsc};
use std::time::{Duration, SystemTime};

fn surfaces_args(
    targets: Vec<Arc<dyn TargetSurface>>,
    callback: Arc<dyn SessionCallback>,
) -> SessionArgs {
    SessionArgs::surfaces(targets, callback)
}

fn args_for(
    shape: SessionShape,
    target: Arc<dyn TargetSurface>,
    callback: Arc<dyn SessionCallback>,
) -> SessionArgs {
    let input = InputConfiguration {
        width: 640,
        height: 480,
        format: 0x23,
    };
    match shape {
        SessionShape::SurfaceList | SessionShape::ConstrainedHighSpeed => {
            SessionArgs::surfaces(vec![target], callback)
        }
        SessionShape::OutputConfigurations => {
            SessionArgs::output_configurations(vec![OutputConfiguration::new(target)], callback)
        }
        SessionShape::Reprocessable => SessionArgs::reprocessable(input, vec![target], callback),
        SessionShape::ReprocessableByConfigurations => SessionArgs::reprocessable_by_configurations(
            input,
            vec![OutputConfiguration::new(target)],
            callback,
        ),
        SessionShape::SessionConfiguration => SessionArgs::configuration(SessionConfiguration {
            session_type: SessionType::HighSpeed,
            outputs: vec![OutputConfiguration::new(target)],
            executor: ExecutorRef("host-executor".into()),
            callback,
        }),
    }
}

#[test]
fn test_preview_gets_exactly_one_render_channel() {
    let h = harness();
    let callback = Arc::new(CountingCallback::default());
    let preview = HeadlessSurface::preview("viewfinder", 8, 8);
    let target: Arc<dyn TargetSurface> = preview.clone();

    h.camera.on_device_open("0");
    h.camera
        .create_session(
            SessionShape::SurfaceList,
            surfaces_args(vec![Arc::clone(&target)], callback.clone()),
        )
        .unwrap();
    assert_eq!(callback.configured.load(Ordering::SeqCst), 1);
    assert_eq!(h.ctx.state(), SessionState::Active);

    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera.add_target(&mut builder, Arc::clone(&target));
    let request = h.camera.build(&builder);

    let sink = h.ctx.sink().unwrap();
    assert_eq!(request.target_ids(), vec![sink.id()]);

    let playback = h.ctx.playback();
    assert_eq!(playback.tier_of(TargetRole::PreviewPrimary), Some(OutputTier::Render));
    assert_eq!(playback.active_players(), 1);
    let channel = playback.compositor_for(TargetRole::PreviewPrimary).unwrap();
    assert_eq!(channel.tier(), CompositorTier::Render);

    // Frames keep arriving and are drawn without touching the decoder
    assert!(wait_for(|| preview.frames_presented() >= 5));
    assert!(channel.frames_drawn() >= 5);
    assert_eq!(h.players.started(), 1);
    assert_eq!(h.players.created(), 1);

    h.camera.capture(&request).unwrap();
    assert_eq!(sink.frames_discarded(), 1);
    h.camera.on_device_close();
    assert_eq!(playback.active_players(), 0);
}

#[test]
fn test_still_capture_replaced_by_placeholder_photo() {
    let h = HarnessBuilder::new()
        .config(Config {
            enable_photo_fake: true,
            ..Config::default()
        })
        .players(ScriptedPlayerFactory::failing())
        .build();
    let reader = ReaderSurface::jpeg(320, 240, 2);
    let (tx, rx) = mpsc::channel();
    reader.queue().set_on_image_available(move |queue| {
        let _ = tx.send(queue.len());
    });
    let target: Arc<dyn TargetSurface> = reader.clone();

    h.camera.on_device_open("0");
    h.camera
        .create_session(
            SessionShape::SurfaceList,
            surfaces_args(vec![Arc::clone(&target)], Arc::new(CountingCallback::default())),
        )
        .unwrap();
    let mut builder = RequestBuilder::new(RequestTemplate::StillCapture);
    h.camera.add_target(&mut builder, Arc::clone(&target));
    assert!(h.ctx.pending_photo().is_pending());

    let request = h.camera.build(&builder);
    h.camera.capture(&request).unwrap();
    assert_eq!(h.platform.real_captures(), 0);

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(1));
    let image = reader.queue().acquire_next_image().unwrap();
    assert!(!image.data().is_empty());
    let decoded = image::load_from_memory(image.data()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 240));

    assert!(wait_for(|| h.ctx.photo().last_outcome() == Some(PhotoState::Injected)));
    assert!(!h.ctx.pending_photo().is_pending());
}

#[test]
fn test_rejected_target_falls_back_to_relay() {
    let h = harness();
    let preview = HeadlessSurface::preview("protected", 8, 8);
    preview.set_accepts_window(false);
    let target: Arc<dyn TargetSurface> = preview.clone();

    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera.add_target(&mut builder, target);
    h.camera.build(&builder);

    let playback = h.ctx.playback();
    assert_eq!(playback.tier_of(TargetRole::PreviewPrimary), Some(OutputTier::Relay));
    let relay = playback.compositor_for(TargetRole::PreviewPrimary).unwrap();
    assert!(relay.is_initialized());

    assert!(wait_for(|| relay.frames_drawn() >= 1));
    assert_eq!(preview.frames_presented(), 0);
    preview.set_accepts_window(true);
    assert!(wait_for(|| relay.is_attached() && preview.frames_presented() >= 1));
}

#[test]
fn test_relay_attaches_by_second_draw() {
    let preview = HeadlessSurface::preview("late", 8, 8);
    preview.set_accepts_window(false);
    let relay = RelayChannel::new(Arc::new(SoftwareBackend::new()), preview.clone(), 0);
    assert!(relay.is_initialized());

    relay.input_surface().deliver(split_frame(4, 4, 0));
    assert!(wait_for(|| relay.frames_drawn() >= 1));
    assert!(!relay.is_attached());

    preview.set_accepts_window(true);
    relay.input_surface().deliver(split_frame(4, 4, 1));
    assert!(wait_for(|| preview.frames_presented() >= 1));
    assert!(relay.is_attached());
    assert!(relay.frames_drawn() <= 2);
    relay.release();
}

#[test]
fn test_rotation_change_reaches_live_channels() {
    let dir = tempfile::tempdir().unwrap();
    let h = HarnessBuilder::new().config_dir(dir.path()).build();
    let first = HeadlessSurface::preview("a", 8, 8);
    let second = HeadlessSurface::preview("b", 8, 8);

    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera.add_target(&mut builder, first.clone());
    h.camera.add_target(&mut builder, second.clone());
    h.camera.build(&builder);

    let playback = h.ctx.playback();
    assert_eq!(playback.tier_of(TargetRole::PreviewPrimary), Some(OutputTier::Render));
    assert_eq!(playback.tier_of(TargetRole::PreviewSecondary), Some(OutputTier::Render));

    let top_row_split = |surface: &Arc<HeadlessSurface>| {
        surface
            .latest_frame()
            .is_some_and(|f| f.pixel(0, 0) == Some(RED) && f.pixel(7, 0) == Some(BLUE))
    };
    assert!(wait_for(|| top_row_split(&first) && top_row_split(&second)));
    let starts = h.players.started();
    let decoder_starts = playback.decoder_starts();

    let watcher = ConfigWatcher::new(h.config.clone(), Arc::clone(playback));
    h.config.update(|c| c.video_rotation_offset = 90).unwrap();
    let file = std::fs::File::options()
        .write(true)
        .open(h.config.path().unwrap())
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();

    let change = watcher.poll().unwrap();
    assert_eq!(change.rotation, Some(90));
    watcher.apply(change);

    // A quarter turn makes the top row a single color
    let top_row_uniform = |surface: &Arc<HeadlessSurface>| {
        surface
            .latest_frame()
            .is_some_and(|f| f.pixel(0, 0) == f.pixel(7, 0) && f.pixel(0, 0) != f.pixel(0, 7))
    };
    assert!(wait_for(|| top_row_uniform(&first) && top_row_uniform(&second)));
    assert_eq!(h.players.started(), starts);
    assert_eq!(playback.decoder_starts(), decoder_starts);
}

#[test]
fn test_settings_file_edit_rotates_live_channels() {
    let dir = tempfile::tempdir().unwrap();
    let h = HarnessBuilder::new().config_dir(dir.path()).build();
    assert!(h.ctx.watches_settings());
    let preview = HeadlessSurface::preview("p", 8, 8);

    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera.add_target(&mut builder, preview.clone());
    h.camera.build(&builder);

    let top_row_split = |surface: &Arc<HeadlessSurface>| {
        surface
            .latest_frame()
            .is_some_and(|f| f.pixel(0, 0) == Some(RED) && f.pixel(7, 0) == Some(BLUE))
    };
    assert!(wait_for(|| top_row_split(&preview)));
    let decoder_starts = h.ctx.playback().decoder_starts();

    // Nobody polls: the context's own watcher picks the edit up
    h.config.update(|c| c.video_rotation_offset = 90).unwrap();

    let top_row_uniform = |surface: &Arc<HeadlessSurface>| {
        surface
            .latest_frame()
            .is_some_and(|f| f.pixel(0, 0) == f.pixel(7, 0) && f.pixel(0, 0) != f.pixel(0, 7))
    };
    assert!(wait_for(|| top_row_uniform(&preview)));
    assert_eq!(h.ctx.playback().decoder_starts(), decoder_starts);
}

#[test]
fn test_in_memory_settings_not_watched() {
    let h = harness();
    assert!(!h.ctx.watches_settings());
}

#[test]
fn test_platform_never_sees_host_targets() {
    let h = harness();
    h.camera.on_device_open("0");
    let sink = h.ctx.sink().unwrap();

    for shape in h.camera.installed().shapes() {
        let target: Arc<dyn TargetSurface> = HeadlessSurface::preview("view", 8, 8);
        let callback = Arc::new(CountingCallback::default());
        h.camera
            .create_session(shape, args_for(shape, Arc::clone(&target), callback.clone()))
            .unwrap();
        assert_eq!(callback.configured.load(Ordering::SeqCst), 1, "{:?}", shape);
    }

    let sessions = h.platform.sessions();
    assert_eq!(sessions.len(), 6);
    for session in sessions {
        assert_eq!(session.target_ids, vec![sink.id()], "{:?}", session.shape);
    }
}

#[test]
fn test_mismatched_session_arguments_forward_sink_only() {
    let h = harness();
    h.camera.on_device_open("0");
    let sink = h.ctx.sink().unwrap();
    let target: Arc<dyn TargetSurface> = HeadlessSurface::preview("view", 8, 8);
    let callback = Arc::new(CountingCallback::default());

    // A surface list where the reprocessable layout expects an input first
    h.camera
        .create_session(
            SessionShape::Reprocessable,
            surfaces_args(vec![Arc::clone(&target)], callback.clone()),
        )
        .unwrap();

    let forwarded = &h.platform.sessions()[0];
    assert!(!forwarded.target_ids.contains(&target.id()));
    assert_eq!(forwarded.target_ids, vec![sink.id()]);
    assert_eq!(callback.configured.load(Ordering::SeqCst), 1);
}

#[test]
fn test_session_configuration_keeps_type_and_executor() {
    let h = harness();
    h.camera.on_device_open("0");
    let target: Arc<dyn TargetSurface> = HeadlessSurface::preview("view", 8, 8);
    h.camera
        .create_session(
            SessionShape::SessionConfiguration,
            args_for(
                SessionShape::SessionConfiguration,
                target,
                Arc::new(CountingCallback::default()),
            ),
        )
        .unwrap();

    let forwarded = &h.platform.sessions()[0];
    assert_eq!(forwarded.session_type, Some(SessionType::HighSpeed));
    assert_eq!(forwarded.executor, Some(ExecutorRef("host-executor".into())));
}

#[test]
fn test_unavailable_shape_passes_through() {
    let h = HarnessBuilder::new().platform_level(21).build();
    assert!(!h.camera.installed().is_installed(SessionShape::OutputConfigurations));
    h.camera.on_device_open("0");

    let target: Arc<dyn TargetSurface> = HeadlessSurface::preview("view", 8, 8);
    h.camera
        .create_session(
            SessionShape::OutputConfigurations,
            args_for(
                SessionShape::OutputConfigurations,
                Arc::clone(&target),
                Arc::new(CountingCallback::default()),
            ),
        )
        .unwrap();
    assert_eq!(h.platform.sessions()[0].target_ids, vec![target.id()]);
}

#[test]
fn test_disabled_module_forwards_verbatim() {
    let h = HarnessBuilder::new()
        .config(Config {
            disable_module: true,
            ..Config::default()
        })
        .build();
    h.camera.on_device_open("0");
    let target: Arc<dyn TargetSurface> = HeadlessSurface::preview("view", 8, 8);
    h.camera
        .create_session(
            SessionShape::SurfaceList,
            surfaces_args(vec![Arc::clone(&target)], Arc::new(CountingCallback::default())),
        )
        .unwrap();
    assert_eq!(h.platform.sessions()[0].target_ids, vec![target.id()]);
    assert_eq!(h.players.created(), 0);
}

#[test]
fn test_missing_media_passes_through() {
    let h = HarnessBuilder::new().media(FixedMedia::absent()).build();
    h.camera.on_device_open("0");
    let target: Arc<dyn TargetSurface> = HeadlessSurface::preview("view", 8, 8);
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera.add_target(&mut builder, Arc::clone(&target));
    let request = h.camera.build(&builder);
    assert_eq!(request.target_ids(), vec![target.id()]);
    assert_eq!(h.ctx.playback().active_players(), 0);
}

#[test]
fn test_register_then_remove_restores_table() {
    let h = harness();
    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    let kept: Arc<dyn TargetSurface> = HeadlessSurface::preview("kept", 8, 8);
    h.camera.add_target(&mut builder, Arc::clone(&kept));
    let before = h.ctx.targets().ids();

    let transient: Arc<dyn TargetSurface> = ReaderSurface::jpeg(8, 8, 1);
    h.camera.add_target(&mut builder, Arc::clone(&transient));
    h.camera.remove_target(&mut builder, &transient);
    assert_eq!(h.ctx.targets().ids(), before);

    h.camera.remove_target(&mut builder, &transient);
    assert_eq!(h.ctx.targets().ids(), before);
}

#[test]
fn test_repeated_build_has_no_effects() {
    let h = harness();
    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera
        .add_target(&mut builder, HeadlessSurface::preview("view", 8, 8));
    h.camera.build(&builder);
    h.camera.build(&builder);
    assert_eq!(h.players.started(), 1);

    // A new builder restarts playback
    let mut next = RequestBuilder::new(RequestTemplate::Record);
    h.camera
        .add_target(&mut next, HeadlessSurface::preview("view", 8, 8));
    h.camera.build(&next);
    assert!(h.players.started() >= 2);
}

#[test]
fn test_single_audio_owner_across_previews() {
    let h = HarnessBuilder::new()
        .config(Config {
            play_video_sound: true,
            ..Config::default()
        })
        .build();
    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera
        .add_target(&mut builder, HeadlessSurface::preview("a", 8, 8));
    h.camera
        .add_target(&mut builder, HeadlessSurface::preview("b", 8, 8));
    h.camera.add_target(&mut builder, ReaderSurface::jpeg(8, 8, 1));
    h.camera.build(&builder);

    assert_eq!(h.ctx.playback().active_players(), 3);
    assert_eq!(h.ctx.playback().audio_owner(), Some(TargetRole::PreviewPrimary));
}

#[test]
fn test_capture_on_released_channel_is_bounded() {
    let h = harness();
    h.camera.on_device_open("0");
    let mut builder = RequestBuilder::new(RequestTemplate::Preview);
    h.camera
        .add_target(&mut builder, HeadlessSurface::preview("view", 8, 8));
    h.camera.build(&builder);
    let channel = h
        .ctx
        .playback()
        .compositor_for(TargetRole::PreviewPrimary)
        .unwrap();

    h.camera.on_device_close();
    let started = std::time::Instant::now();
    assert!(channel.capture_frame(8, 8).is_none());
    assert!(started.elapsed() < Duration::from_millis(2500));
}

#[test]
fn test_legacy_picture_calls_jpeg_once() {
    let h = HarnessBuilder::new()
        .config(Config {
            enable_photo_fake: true,
            ..Config::default()
        })
        .build();
    let legacy = LegacyCamera::open(Arc::clone(&h.ctx), h.platform.clone());
    legacy.set_preview_size(64, 48);

    let (tx, rx) = mpsc::channel();
    legacy.take_picture(
        None,
        None,
        Some(Box::new(move |data| {
            let _ = tx.send(data);
        })),
    );

    let received: Vec<Vec<u8>> = rx.try_iter().collect();
    assert_eq!(received.len(), 1);
    let decoded = image::load_from_memory(&received[0]).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
    assert_eq!(h.platform.real_captures(), 0);
    legacy.release();
}

#[test]
fn test_legacy_picture_forwarded_without_fake_photo() {
    let h = harness();
    let legacy = LegacyCamera::open(Arc::clone(&h.ctx), h.platform.clone());
    let (tx, rx) = mpsc::channel();
    legacy.take_picture_with_postview(
        None,
        None,
        None,
        Some(Box::new(move |data| {
            let _ = tx.send(data);
        })),
    );
    assert_eq!(h.platform.real_captures(), 1);
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_legacy_preview_frames_are_nv21() {
    let h = harness();
    let legacy = LegacyCamera::open(Arc::clone(&h.ctx), h.platform.clone());
    legacy.set_preview_size(4, 4);

    // Host buffer one byte short of a full frame
    legacy.add_callback_buffer(vec![0; 23]);
    let filled = legacy.deliver_preview_frame().unwrap();
    assert_eq!(filled.len(), 23);
    assert!(filled.iter().any(|b| *b != 0));

    let stored = h.ctx.raw_frames().latest().unwrap();
    assert_eq!((stored.width, stored.height), (4, 4));
    assert_eq!(stored.data.len(), 24);
    legacy.release();
    assert_eq!(h.ctx.state(), SessionState::Closed);
}

#[test]
fn test_legacy_frame_decoder_failure_not_retried() {
    let h = HarnessBuilder::new()
        .players(ScriptedPlayerFactory::failing())
        .build();
    let legacy = LegacyCamera::open(Arc::clone(&h.ctx), h.platform.clone());
    legacy.set_preview_size(4, 4);

    for _ in 0..3 {
        let mut buffer = vec![0u8; 24];
        assert_eq!(legacy.on_preview_frame(&mut buffer), 0);
        assert!(buffer.iter().all(|b| *b == 0));
    }
    assert_eq!(h.players.created(), 1);

    // Releasing the camera allows a fresh attempt
    legacy.release();
    let mut buffer = vec![0u8; 24];
    legacy.on_preview_frame(&mut buffer);
    assert_eq!(h.players.created(), 2);
}
