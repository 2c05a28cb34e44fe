// SPDX-License-Identifier: MPL-2.0

//! Backend layer: camera interception and frame compositing
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Host camera calls             │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │     Capture      │  │   Compositor    │  │
//! │  │ (interception,   │  │ (render/relay   │  │
//! │  │  virtual sink)   │  │  channels)      │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`capture`]: session and single-callback interception, target tracking
//! - [`compositor`]: GPU and software channels presenting decoded frames

pub mod capture;
pub mod compositor;
