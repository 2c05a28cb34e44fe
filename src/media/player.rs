// SPDX-License-Identifier: MPL-2.0

//! Decoder-backed media player abstraction
//!
//! A player decodes the substitute media and pushes every decoded frame into
//! a [`FrameSink`]. The sink is either a compositor input surface or, in the
//! passthrough tier, the target surface itself.

use super::frame::VideoFrame;
use super::source::MediaSource;
use crate::errors::MediaError;
use std::sync::Arc;
use std::time::Duration;

/// Receiver of decoded frames
///
/// Called on a decoder-internal thread; implementations must not block.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: VideoFrame);
}

/// Lifecycle of one media player
///
/// The call order used by the orchestrator is: `set_muted`, `set_looping`,
/// `set_source`, `prepare`, `set_output`, `start`. `prepare` is synchronous.
pub trait MediaPlayer: Send {
    fn set_source(&mut self, source: MediaSource) -> Result<(), MediaError>;

    /// Open and preroll the source; blocks until ready or failed
    fn prepare(&mut self) -> Result<(), MediaError>;

    fn set_output(&mut self, output: Arc<dyn FrameSink>);

    fn set_looping(&mut self, looping: bool);

    fn set_muted(&mut self, muted: bool);

    fn start(&mut self) -> Result<(), MediaError>;

    fn stop(&mut self);

    /// Return to the idle state, dropping source and output
    fn reset(&mut self);

    /// Free all resources; the player is unusable afterwards
    fn release(&mut self);

    fn is_playing(&self) -> bool;

    /// Current playback position
    fn position(&self) -> Option<Duration>;
}

/// Creates players for targets
pub trait PlayerFactory: Send + Sync {
    fn create(&self, tag: &str) -> Box<dyn MediaPlayer>;
}

/// Closure adapter for ad-hoc sinks
pub struct FnSink<F>(pub F);

impl<F> FrameSink for FnSink<F>
where
    F: Fn(VideoFrame) + Send + Sync,
{
    fn deliver(&self, frame: VideoFrame) {
        (self.0)(frame)
    }
}
