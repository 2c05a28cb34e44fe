// SPDX-License-Identifier: MPL-2.0

//! camswap - camera output virtualization
//!
//! Intercepts a host's camera capture calls and replaces what the camera
//! produces with frames decoded from a substitute video. Real output targets
//! are swapped for one internal sink; the real targets are fed the substitute
//! media through a GPU (or software) compositor, and still captures are
//! answered with an injected image.
//!
//! # Architecture
//!
//! - [`backends`]: capture interception and the render/relay compositors
//! - [`pipelines`]: playback orchestration and photo injection
//! - [`media`]: frames, media sources, decoding and snapshots
//! - [`config`]: settings file and provider; [`watcher`] applies live changes
//! - [`notify`]: user-visible notices
//!
//! # Example
//!
//! ```ignore
//! let ctx = SessionContext::new(collaborators)?;
//! let camera = CaptureInterceptor::new(ctx, platform);
//! camera.on_device_open("0");
//! camera.add_target(&mut builder, preview);
//! let request = camera.build(&builder);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod notify;
pub mod pipelines;
pub mod shaders;
pub mod tasks;
pub mod watcher;

// Re-export commonly used types
pub use backends::capture::{
    CaptureInterceptor, Collaborators, LegacyCamera, PlatformCamera, SessionContext,
    SimulatedPlatform,
};
pub use config::{Config, ConfigManager, ConfigProvider};
pub use constants::JpegQuality;
pub use errors::{AppError, AppResult};
