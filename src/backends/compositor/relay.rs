// SPDX-License-Identifier: GPL-3.0-only

//! Relay channel: the secondary compositor tier
//!
//! Used for targets that refuse a window at construction. Always renders into
//! a private 1x1 off-screen surface first, and retries attaching the real
//! target on every draw. While detached, frames are consumed so the decoder
//! keeps flowing, but nothing reaches the target.

use super::channel::{ChannelCore, CompositorTier, delegate_compositor};
use super::graphics::{GraphicsBackend, GraphicsContext};
use crate::backends::capture::TargetSurface;
use crate::constants::compositor::RELAY_PBUFFER_SIZE;
use crate::errors::CompositorError;
use std::sync::Arc;
use tracing::debug;

pub struct RelayChannel {
    core: ChannelCore,
}

fn setup(
    ctx: &mut dyn GraphicsContext,
    target: &Arc<dyn TargetSurface>,
) -> Result<(), CompositorError> {
    let (width, height) = RELAY_PBUFFER_SIZE;
    ctx.attach_offscreen(width, height)?;
    ctx.link_program()?;
    ctx.create_external_texture()?;

    // First attempt; failure is the expected case for this tier
    if let Err(e) = ctx.attach_window(Arc::clone(target)) {
        debug!(target_surface = %target.describe(), error = %e, "Relay starts detached");
    }
    Ok(())
}

impl RelayChannel {
    pub fn new(
        backend: Arc<dyn GraphicsBackend>,
        target: Arc<dyn TargetSurface>,
        rotation: i32,
    ) -> Self {
        Self {
            core: ChannelCore::start(CompositorTier::Relay, backend, target, rotation, setup),
        }
    }
}

delegate_compositor!(RelayChannel);

impl std::fmt::Debug for RelayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayChannel")
            .field("label", &self.core.label())
            .field("attached", &self.core.is_target_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::channel::Compositor;
    use super::super::software::SoftwareBackend;
    use super::*;
    use crate::backends::capture::HeadlessSurface;
    use crate::media::frame::VideoFrame;
    use crate::media::player::FrameSink;
    use std::time::{Duration, Instant};

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_initializes_even_when_target_refuses() {
        let target = HeadlessSurface::preview("protected", 8, 8);
        target.set_accepts_window(false);
        let relay = RelayChannel::new(Arc::new(SoftwareBackend::new()), target.clone(), 0);
        assert!(relay.is_initialized());
        assert!(!relay.is_attached());

        // Detached frames are drained without reaching the target
        relay
            .input_surface()
            .deliver(VideoFrame::solid(2, 2, [9, 9, 9, 255], 0));
        assert!(wait_for(|| relay.frames_drawn() >= 1));
        assert_eq!(target.frames_presented(), 0);
        relay.release();
    }

    #[test]
    fn test_attaches_once_target_becomes_valid() {
        let target = HeadlessSurface::preview("late", 8, 8);
        target.set_accepts_window(false);
        let relay = RelayChannel::new(Arc::new(SoftwareBackend::new()), target.clone(), 0);

        relay
            .input_surface()
            .deliver(VideoFrame::solid(2, 2, [1, 2, 3, 255], 0));
        assert!(wait_for(|| relay.frames_drawn() >= 1));

        target.set_accepts_window(true);
        relay
            .input_surface()
            .deliver(VideoFrame::solid(2, 2, [1, 2, 3, 255], 1));
        assert!(wait_for(|| target.frames_presented() >= 1));
        assert!(relay.is_attached());
        assert_eq!(
            target.latest_frame().map(|f| (f.width, f.height)),
            Some((8, 8))
        );

        // Stays attached without further retries
        target.set_accepts_window(false);
        relay
            .input_surface()
            .deliver(VideoFrame::solid(2, 2, [1, 2, 3, 255], 2));
        assert!(wait_for(|| target.frames_presented() >= 2));
        relay.release();
    }

    #[test]
    fn test_attached_immediately_when_allowed() {
        let target = HeadlessSurface::preview("plain", 4, 4);
        let relay = RelayChannel::new(Arc::new(SoftwareBackend::new()), target, 90);
        assert!(relay.is_attached());
        assert_eq!(relay.rotation(), 90);
        relay.release();
        assert!(!relay.is_attached());
    }
}
