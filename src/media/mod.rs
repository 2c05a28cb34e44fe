// SPDX-License-Identifier: MPL-2.0

//! Substitute media: frames, sources, decoding and snapshots
//!
//! # Frames
//!
//! Decoders produce RGBA [`VideoFrame`]s. The continuous preview-frame path
//! converts them to NV21 at the host's declared preview size.
//!
//! # Sources
//!
//! [`MediaSourceProvider`] resolves the current substitute media, preferring
//! an open descriptor over a path. [`MediaLibrary`] is the directory-backed
//! implementation driven by the settings file.
//!
//! # Decoding
//!
//! [`MediaPlayer`] is the per-target decoder. [`GstMediaPlayer`] decodes with
//! GStreamer and pushes frames into a [`FrameSink`]. [`GstSnapshotter`]
//! decodes a single frame at a position for photo production.

pub mod frame;
pub mod gst_player;
pub mod player;
pub mod snapshot;
pub mod source;

pub use frame::{Nv21Frame, VideoFrame};
pub use gst_player::{GstMediaPlayer, GstPlayerFactory};
pub use player::{FnSink, FrameSink, MediaPlayer, PlayerFactory};
pub use snapshot::{FrameSnapshotter, GstSnapshotter};
pub use source::{MediaLibrary, MediaSource, MediaSourceProvider};
