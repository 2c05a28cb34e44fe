// SPDX-License-Identifier: GPL-3.0-only

//! Playback orchestration
//!
//! One decoder per tracked target, bound to the target through the compositor
//! tiers. All per-slot state lives behind one mutex, which doubles as the
//! restart region: starting, restarting and tearing down players never
//! interleave between targets.
//!
//! Per target the sequence is:
//!
//! 1. release whatever was bound to the slot
//! 2. try the eager compositor tiers (render)
//! 3. configure the player: mute, loop, source, synchronous prepare
//! 4. after a successful prepare, try the remaining tiers (relay)
//! 5. bind the output (compositor input or the target itself) and start

pub mod audio;
pub mod tiers;

pub use audio::AudioGate;
pub use tiers::{
    CompositorStrategy, OutputTier, RelayStrategy, RenderStrategy, TierRequest,
    default_strategies,
};

use crate::backends::capture::{TargetRole, TargetSink, TargetSurface, TargetTable};
use crate::backends::compositor::{Compositor, GraphicsBackend};
use crate::config::ConfigProvider;
use crate::errors::MediaError;
use crate::media::{FrameSink, MediaPlayer, MediaSourceProvider, PlayerFactory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tiers::first_compositor;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Slot {
    target: Option<Arc<dyn TargetSurface>>,
    player: Option<Box<dyn MediaPlayer>>,
    compositor: Option<Arc<dyn Compositor>>,
    tier: Option<OutputTier>,
}

impl Slot {
    fn release(&mut self) {
        if let Some(compositor) = self.compositor.take() {
            compositor.release();
        }
        if let Some(mut player) = self.player.take() {
            player.stop();
            player.release();
        }
        self.tier = None;
    }

    /// Where the decoder should write
    fn output(&self) -> Option<Arc<dyn FrameSink>> {
        let target = self.target.as_ref()?;
        Some(decoder_output(self.compositor.as_ref(), target))
    }
}

/// Compositor input when one is bound, else the target itself
fn decoder_output(
    compositor: Option<&Arc<dyn Compositor>>,
    target: &Arc<dyn TargetSurface>,
) -> Arc<dyn FrameSink> {
    match compositor {
        Some(compositor) => Arc::new(compositor.input_surface()),
        None => Arc::new(TargetSink(Arc::clone(target))),
    }
}

pub struct PlaybackOrchestrator {
    slots: Mutex<[Slot; 4]>,
    backend: Arc<dyn GraphicsBackend>,
    players: Arc<dyn PlayerFactory>,
    media: Arc<dyn MediaSourceProvider>,
    config: Arc<dyn ConfigProvider>,
    strategies: Vec<Box<dyn CompositorStrategy>>,
    audio: AudioGate,
    decoder_starts: AtomicU64,
}

impl PlaybackOrchestrator {
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        players: Arc<dyn PlayerFactory>,
        media: Arc<dyn MediaSourceProvider>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self::with_strategies(backend, players, media, config, default_strategies())
    }

    pub fn with_strategies(
        backend: Arc<dyn GraphicsBackend>,
        players: Arc<dyn PlayerFactory>,
        media: Arc<dyn MediaSourceProvider>,
        config: Arc<dyn ConfigProvider>,
        strategies: Vec<Box<dyn CompositorStrategy>>,
    ) -> Self {
        Self {
            slots: Mutex::new(Default::default()),
            backend,
            players,
            media,
            config,
            strategies,
            audio: AudioGate::new(),
            decoder_starts: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, [Slot; 4]>> {
        match self.slots.lock() {
            Ok(slots) => Some(slots),
            Err(_) => {
                warn!("Playback slots poisoned");
                None
            }
        }
    }

    /// (Re)start playback for every tracked target
    ///
    /// Slots whose target is no longer tracked are released.
    pub fn start_all(&self, table: &TargetTable) {
        let Some(mut slots) = self.lock() else {
            return;
        };
        for role in TargetRole::ALL {
            let slot = &mut slots[role.index()];
            match table.get(role) {
                Some(target) => {
                    self.start_slot(slot, role, Arc::clone(target));
                }
                None if slot.target.is_some() => {
                    debug!(role = %role, "Target no longer tracked, releasing playback");
                    slot.release();
                    slot.target = None;
                    self.audio.release(role);
                }
                None => {}
            }
        }
    }

    /// Start playback only for tracked targets without a running player
    ///
    /// Returns how many slots were started.
    pub fn start_missing(&self, table: &TargetTable) -> usize {
        let Some(mut slots) = self.lock() else {
            return 0;
        };
        let mut started = 0;
        for (role, target) in table.iter() {
            let slot = &mut slots[role.index()];
            let bound = slot
                .target
                .as_ref()
                .is_some_and(|t| t.id() == target.id());
            if bound && slot.player.is_some() {
                continue;
            }
            if self.start_slot(slot, role, Arc::clone(target)).is_some() {
                started += 1;
            }
        }
        started
    }

    /// (Re)start playback for one target
    pub fn start_for_target(
        &self,
        role: TargetRole,
        target: Arc<dyn TargetSurface>,
    ) -> Option<OutputTier> {
        let mut slots = self.lock()?;
        self.start_slot(&mut slots[role.index()], role, target)
    }

    fn start_slot(
        &self,
        slot: &mut Slot,
        role: TargetRole,
        target: Arc<dyn TargetSurface>,
    ) -> Option<OutputTier> {
        slot.release();
        self.audio.release(role);
        slot.target = Some(Arc::clone(&target));

        if !target.is_valid() {
            debug!(role = %role, "Target invalid, playback skipped");
            return None;
        }

        let request = TierRequest {
            backend: &self.backend,
            target: &target,
            rotation: self.config.video_rotation_offset(),
        };
        slot.compositor = first_compositor(&self.strategies, true, &request);

        let mut player = self.players.create(role.tag());
        let wants_sound = !role.is_reader() && self.config.play_video_sound();
        let audible = wants_sound && self.audio.acquire(role);
        player.set_muted(!audible);
        player.set_looping(true);

        if let Err(e) = self.prepare(player.as_mut()) {
            warn!(role = %role, error = %e, "Playback could not be prepared");
            player.release();
            if let Some(compositor) = slot.compositor.take() {
                compositor.release();
            }
            self.audio.release(role);
            return None;
        }

        if slot.compositor.is_none() {
            slot.compositor = first_compositor(&self.strategies, false, &request);
        }
        let tier = slot
            .compositor
            .as_ref()
            .map_or(OutputTier::Direct, |c| OutputTier::from(c.tier()));

        player.set_output(decoder_output(slot.compositor.as_ref(), &target));
        if let Err(e) = player.start() {
            warn!(role = %role, error = %e, "Playback failed to start");
            player.release();
            slot.release();
            self.audio.release(role);
            return None;
        }
        self.decoder_starts.fetch_add(1, Ordering::Relaxed);

        info!(role = %role, tier = %tier, muted = !audible, target_surface = %target.describe(), "Playback started");
        slot.player = Some(player);
        slot.tier = Some(tier);
        Some(tier)
    }

    fn prepare(&self, player: &mut dyn MediaPlayer) -> Result<(), MediaError> {
        let source = self.media.open().ok_or(MediaError::NoSource)?;
        debug!(source = %source.describe(), "Opening substitute media");
        player.set_source(source)?;
        player.prepare()
    }

    /// Restart every decoder against the current media source
    ///
    /// Compositors stay bound; each player is stopped, reset, re-opened and
    /// pointed at its existing output again.
    pub fn restart_all(&self) {
        let Some(mut slots) = self.lock() else {
            return;
        };
        for role in TargetRole::ALL {
            let slot = &mut slots[role.index()];
            if slot.player.is_none() {
                continue;
            }
            let output = slot.output();
            let Some(player) = slot.player.as_mut() else {
                continue;
            };
            player.stop();
            player.reset();

            let result = self.prepare(player.as_mut()).and_then(|()| {
                if let Some(output) = output {
                    player.set_output(output);
                }
                player.start()
            });
            match result {
                Ok(()) => {
                    self.decoder_starts.fetch_add(1, Ordering::Relaxed);
                    info!(role = %role, "Playback restarted");
                }
                Err(e) => warn!(role = %role, error = %e, "Playback restart failed"),
            }
        }
    }

    /// Push a rotation to every live compositor; decoders are untouched
    pub fn update_rotation(&self, degrees: i32) {
        let Some(slots) = self.lock() else {
            return;
        };
        let mut updated = 0;
        for compositor in slots.iter().filter_map(|s| s.compositor.as_ref()) {
            if compositor.is_initialized() {
                compositor.set_rotation(degrees);
                updated += 1;
            }
        }
        info!(degrees, channels = updated, "Rotation updated");
    }

    /// Release every compositor, keeping players and targets
    pub fn release_all_compositors(&self) {
        let Some(mut slots) = self.lock() else {
            return;
        };
        for slot in slots.iter_mut() {
            if let Some(compositor) = slot.compositor.take() {
                compositor.release();
            }
        }
    }

    /// Full teardown at a device open or close boundary
    pub fn release_targets_for_device_close(&self) {
        let Some(mut slots) = self.lock() else {
            return;
        };
        let mut released = 0;
        for slot in slots.iter_mut() {
            if slot.player.is_some() || slot.compositor.is_some() {
                released += 1;
            }
            slot.release();
            slot.target = None;
        }
        self.audio.clear();
        if released > 0 {
            info!(released, "Playback released for device close");
        }
    }

    /// First initialized compositor, previews before readers
    pub fn active_channel(&self) -> Option<Arc<dyn Compositor>> {
        let slots = self.lock()?;
        TargetRole::ALL
            .iter()
            .filter_map(|role| slots[role.index()].compositor.as_ref())
            .find(|c| c.is_initialized())
            .cloned()
    }

    /// Position of the first playing decoder
    pub fn playback_position(&self) -> Option<Duration> {
        let slots = self.lock()?;
        slots
            .iter()
            .filter_map(|s| s.player.as_ref())
            .filter(|p| p.is_playing())
            .find_map(|p| p.position())
    }

    pub fn tier_of(&self, role: TargetRole) -> Option<OutputTier> {
        self.lock().and_then(|slots| slots[role.index()].tier)
    }

    pub fn compositor_for(&self, role: TargetRole) -> Option<Arc<dyn Compositor>> {
        self.lock()
            .and_then(|slots| slots[role.index()].compositor.clone())
    }

    pub fn is_playing(&self, role: TargetRole) -> bool {
        self.lock().is_some_and(|slots| {
            slots[role.index()]
                .player
                .as_ref()
                .is_some_and(|p| p.is_playing())
        })
    }

    /// Number of active players
    pub fn active_players(&self) -> usize {
        self.lock()
            .map_or(0, |slots| slots.iter().filter(|s| s.player.is_some()).count())
    }

    pub fn audio_owner(&self) -> Option<TargetRole> {
        self.audio.owner()
    }

    /// Successful decoder starts, including restarts
    pub fn decoder_starts(&self) -> u64 {
        self.decoder_starts.load(Ordering::Relaxed)
    }
}

impl Drop for PlaybackOrchestrator {
    fn drop(&mut self) {
        if let Ok(slots) = self.slots.get_mut() {
            for slot in slots.iter_mut() {
                slot.release();
            }
        }
    }
}
