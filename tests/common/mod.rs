// SPDX-License-Identifier: MPL-2.0

//! Test doubles shared by the integration tests
//!
//! Decoding is scripted: players emit a split-color frame on a background
//! thread while playing, so compositors see a continuous frame stream without
//! any media files or GStreamer.

#![allow(dead_code)]

use camswap::backends::capture::{CaptureSession, SessionCallback};
use camswap::backends::compositor::SoftwareBackend;
use camswap::errors::MediaError;
use camswap::media::{
    FrameSink, FrameSnapshotter, MediaPlayer, MediaSource, MediaSourceProvider, PlayerFactory,
    VideoFrame,
};
use camswap::notify::LogPresenter;
use camswap::{
    CaptureInterceptor, Collaborators, Config, ConfigManager, SessionContext, SimulatedPlatform,
};
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];

/// Left half red, right half blue
pub fn split_frame(width: u32, height: u32, sequence: u64) -> VideoFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for x in 0..width {
            data.extend_from_slice(if x < width / 2 { &RED } else { &BLUE });
        }
    }
    VideoFrame::from_rgba(width, height, data, sequence).unwrap()
}

/// Poll `condition` for up to two seconds
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Counters shared by every player of a factory
#[derive(Default)]
pub struct PlayerStats {
    pub created: AtomicU64,
    pub prepared: AtomicU64,
    pub started: AtomicU64,
    pub tags: Mutex<Vec<String>>,
}

impl PlayerStats {
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }
}

pub struct ScriptedPlayer {
    stats: Arc<PlayerStats>,
    fail_prepare: bool,
    prepared: bool,
    output: Option<Arc<dyn FrameSink>>,
    running: Arc<AtomicBool>,
    emitter: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl ScriptedPlayer {
    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(emitter) = self.emitter.take() {
            let _ = emitter.join();
        }
    }
}

impl MediaPlayer for ScriptedPlayer {
    fn set_source(&mut self, _: MediaSource) -> Result<(), MediaError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), MediaError> {
        if self.fail_prepare {
            return Err(MediaError::PrepareFailed("unreadable media".into()));
        }
        self.prepared = true;
        self.stats.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_output(&mut self, output: Arc<dyn FrameSink>) {
        self.output = Some(output);
    }

    fn set_looping(&mut self, _: bool) {}

    fn set_muted(&mut self, _: bool) {}

    fn start(&mut self) -> Result<(), MediaError> {
        if !self.prepared {
            return Err(MediaError::InvalidState("not prepared"));
        }
        let output = self.output.clone().ok_or(MediaError::InvalidState("no output"))?;
        self.halt();
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        self.emitter = Some(std::thread::spawn(move || {
            let mut sequence = 0;
            while running.load(Ordering::SeqCst) {
                output.deliver(split_frame(4, 4, sequence));
                sequence += 1;
                std::thread::sleep(Duration::from_millis(5));
            }
        }));
        self.started_at = Some(Instant::now());
        self.stats.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.halt();
    }

    fn reset(&mut self) {
        self.halt();
        self.prepared = false;
        self.output = None;
    }

    fn release(&mut self) {
        self.reset();
    }

    fn is_playing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn position(&self) -> Option<Duration> {
        self.started_at.map(|at| at.elapsed())
    }
}

impl Drop for ScriptedPlayer {
    fn drop(&mut self) {
        self.halt();
    }
}

#[derive(Default)]
pub struct ScriptedPlayerFactory {
    pub stats: Arc<PlayerStats>,
    pub fail_prepare: bool,
}

impl ScriptedPlayerFactory {
    pub fn failing() -> Self {
        Self {
            fail_prepare: true,
            ..Self::default()
        }
    }
}

impl PlayerFactory for ScriptedPlayerFactory {
    fn create(&self, tag: &str) -> Box<dyn MediaPlayer> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut tags) = self.stats.tags.lock() {
            tags.push(tag.to_string());
        }
        Box::new(ScriptedPlayer {
            stats: Arc::clone(&self.stats),
            fail_prepare: self.fail_prepare,
            prepared: false,
            output: None,
            running: Arc::new(AtomicBool::new(false)),
            emitter: None,
            started_at: None,
        })
    }
}

/// Media provider with a fixed (possibly absent) video
pub struct FixedMedia(pub Option<PathBuf>);

impl FixedMedia {
    pub fn present() -> Self {
        Self(Some(PathBuf::from("/media/Cam.mp4")))
    }

    pub fn absent() -> Self {
        Self(None)
    }
}

impl MediaSourceProvider for FixedMedia {
    fn current_path(&self) -> Option<PathBuf> {
        self.0.clone()
    }

    fn current_fd(&self) -> Option<OwnedFd> {
        None
    }

    fn switch_to_next(&self) -> bool {
        false
    }

    fn switch_to_previous(&self) -> bool {
        false
    }
}

/// Snapshotter for media that cannot be decoded
pub struct FailingSnapshotter;

impl FrameSnapshotter for FailingSnapshotter {
    fn frame_at(&self, path: &Path, _: Duration) -> Result<VideoFrame, MediaError> {
        Err(MediaError::OpenFailed(path.display().to_string()))
    }
}

/// Host session callback counting what it was told
#[derive(Default)]
pub struct CountingCallback {
    pub configured: AtomicU64,
    pub failed: AtomicU64,
}

impl SessionCallback for CountingCallback {
    fn on_configured(&self, _: &CaptureSession) {
        self.configured.fetch_add(1, Ordering::SeqCst);
    }

    fn on_configure_failed(&self, _: &CaptureSession) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub config: Arc<ConfigManager>,
    pub ctx: Arc<SessionContext>,
    pub camera: CaptureInterceptor,
    pub platform: Arc<SimulatedPlatform>,
    pub players: Arc<PlayerStats>,
}

pub struct HarnessBuilder {
    config: Config,
    media: FixedMedia,
    factory: ScriptedPlayerFactory,
    platform_level: u32,
    dir: Option<PathBuf>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            media: FixedMedia::present(),
            factory: ScriptedPlayerFactory::default(),
            platform_level: 34,
            dir: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn media(mut self, media: FixedMedia) -> Self {
        self.media = media;
        self
    }

    pub fn players(mut self, factory: ScriptedPlayerFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn platform_level(mut self, level: u32) -> Self {
        self.platform_level = level;
        self
    }

    /// Keep the settings in `dir/cs_config.json` instead of memory
    pub fn config_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    pub fn build(self) -> Harness {
        let config = match &self.dir {
            Some(dir) => {
                let manager = ConfigManager::open(dir);
                let settings = self.config.clone();
                manager.update(move |c| *c = settings).unwrap();
                Arc::new(manager)
            }
            None => Arc::new(ConfigManager::in_memory(self.config.clone())),
        };
        let players = Arc::clone(&self.factory.stats);
        let ctx = SessionContext::new(Collaborators {
            config: config.clone(),
            media: Arc::new(self.media),
            presenter: Arc::new(LogPresenter),
            graphics: Arc::new(SoftwareBackend::new()),
            players: Arc::new(self.factory),
            snapshotter: Arc::new(FailingSnapshotter),
        })
        .unwrap();
        let platform = Arc::new(SimulatedPlatform::new(self.platform_level));
        let camera = CaptureInterceptor::new(Arc::clone(&ctx), platform.clone());
        Harness {
            config,
            ctx,
            camera,
            platform,
            players,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}
