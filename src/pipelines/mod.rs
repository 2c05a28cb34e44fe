// SPDX-License-Identifier: MPL-2.0

//! Media pipelines behind the intercepted camera
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────┐     ┌──────────────┐
//! │ Substitute   │ ──▶ │ Playback           │ ──▶ │ Host targets │
//! │ media        │     │  - decoder/target  │     │ (rotated)    │
//! │              │     │  - render / relay  │     │              │
//! └──────────────┘     └────────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌────────────────────┐     ┌──────────────┐
//! │ Still        │ ──▶ │ Photo injection    │ ──▶ │ Host image   │
//! │ capture      │     │  - production tiers│     │ queue / JPEG │
//! │ (suppressed) │     │  - JPEG encoding   │     │ callback     │
//! └──────────────┘     └────────────────────┘     └──────────────┘
//! ```
//!
//! - [`playback`]: one decoder per tracked target and its compositor tier
//! - [`photo`]: replacement still images

pub mod photo;
pub mod playback;
