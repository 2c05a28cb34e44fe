// SPDX-License-Identifier: GPL-3.0-only

//! Render channel: the primary compositor tier
//!
//! Attaches a graphics window directly to the target at construction. If the
//! target is degenerate or refuses the window, the channel comes up
//! uninitialized and the caller falls back to the relay tier.

use super::channel::{ChannelCore, CompositorTier, delegate_compositor};
use super::graphics::{GraphicsBackend, GraphicsContext};
use crate::backends::capture::TargetSurface;
use crate::constants::compositor::INIT_TIMEOUT;
use crate::errors::CompositorError;
use std::sync::Arc;
use std::time::Duration;

pub struct RenderChannel {
    core: ChannelCore,
}

/// Context, window, program, texture; runs on the compositor thread
fn setup(
    ctx: &mut dyn GraphicsContext,
    target: &Arc<dyn TargetSurface>,
) -> Result<(), CompositorError> {
    let (width, height) = target.size();
    if width <= 1 && height <= 1 {
        return Err(CompositorError::DegenerateTarget { width, height });
    }
    ctx.attach_window(Arc::clone(target))?;
    ctx.link_program()?;
    ctx.create_external_texture()?;
    Ok(())
}

impl RenderChannel {
    /// Blocks up to the initialization bound; check `is_initialized` afterwards
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        target: Arc<dyn TargetSurface>,
        rotation: i32,
    ) -> Self {
        Self::with_init_timeout(backend, target, rotation, INIT_TIMEOUT)
    }

    /// As [`RenderChannel::new`] with a custom initialization bound
    pub fn with_init_timeout(
        backend: Arc<dyn GraphicsBackend>,
        target: Arc<dyn TargetSurface>,
        rotation: i32,
        init_timeout: Duration,
    ) -> Self {
        Self {
            core: ChannelCore::start_within(
                CompositorTier::Render,
                backend,
                target,
                rotation,
                setup,
                init_timeout,
            ),
        }
    }
}

delegate_compositor!(RenderChannel);

impl std::fmt::Debug for RenderChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use super::channel::Compositor;
        f.debug_struct("RenderChannel")
            .field("label", &self.core.label())
            .field("initialized", &self.core.is_initialized())
            .field("rotation", &self.core.rotation())
            .finish()
    }
}
