// SPDX-License-Identifier: GPL-3.0-only

//! Output tiers of a target's playback
//!
//! A decoder's output is bound to the first tier that comes up: the render
//! channel, then the relay channel, then the target itself. The compositor
//! tiers are strategies tried in order; the direct tier is what remains when
//! none of them initializes.

use crate::backends::capture::TargetSurface;
use crate::backends::compositor::{
    Compositor, CompositorTier, GraphicsBackend, RelayChannel, RenderChannel,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Where a decoder's frames end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTier {
    Render,
    Relay,
    /// Decoder writes into the target; no rotation
    Direct,
}

impl From<CompositorTier> for OutputTier {
    fn from(tier: CompositorTier) -> Self {
        match tier {
            CompositorTier::Render => OutputTier::Render,
            CompositorTier::Relay => OutputTier::Relay,
        }
    }
}

impl std::fmt::Display for OutputTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTier::Render => f.write_str("render"),
            OutputTier::Relay => f.write_str("relay"),
            OutputTier::Direct => f.write_str("direct"),
        }
    }
}

/// Inputs for building a compositor
pub struct TierRequest<'a> {
    pub backend: &'a Arc<dyn GraphicsBackend>,
    pub target: &'a Arc<dyn TargetSurface>,
    pub rotation: i32,
}

/// One compositor tier
pub trait CompositorStrategy: Send + Sync {
    fn tier(&self) -> CompositorTier;

    /// Built before the decoder is prepared rather than after
    fn eager(&self) -> bool {
        false
    }

    /// An initialized compositor, or `None` to fall through
    fn attempt(&self, request: &TierRequest<'_>) -> Option<Arc<dyn Compositor>>;
}

fn keep_if_initialized(channel: Arc<dyn Compositor>) -> Option<Arc<dyn Compositor>> {
    if channel.is_initialized() {
        info!(tier = %channel.tier(), "Compositor ready");
        Some(channel)
    } else {
        debug!(tier = %channel.tier(), "Compositor not initialized, falling through");
        channel.release();
        None
    }
}

pub struct RenderStrategy;

impl CompositorStrategy for RenderStrategy {
    fn tier(&self) -> CompositorTier {
        CompositorTier::Render
    }

    fn eager(&self) -> bool {
        true
    }

    fn attempt(&self, request: &TierRequest<'_>) -> Option<Arc<dyn Compositor>> {
        keep_if_initialized(Arc::new(RenderChannel::new(
            Arc::clone(request.backend),
            Arc::clone(request.target),
            request.rotation,
        )))
    }
}

pub struct RelayStrategy;

impl CompositorStrategy for RelayStrategy {
    fn tier(&self) -> CompositorTier {
        CompositorTier::Relay
    }

    fn attempt(&self, request: &TierRequest<'_>) -> Option<Arc<dyn Compositor>> {
        keep_if_initialized(Arc::new(RelayChannel::new(
            Arc::clone(request.backend),
            Arc::clone(request.target),
            request.rotation,
        )))
    }
}

/// Render, then relay
pub fn default_strategies() -> Vec<Box<dyn CompositorStrategy>> {
    vec![Box::new(RenderStrategy), Box::new(RelayStrategy)]
}

/// First strategy of the requested phase that yields a compositor
pub fn first_compositor(
    strategies: &[Box<dyn CompositorStrategy>],
    eager: bool,
    request: &TierRequest<'_>,
) -> Option<Arc<dyn Compositor>> {
    strategies
        .iter()
        .filter(|s| s.eager() == eager)
        .find_map(|s| s.attempt(request))
}
