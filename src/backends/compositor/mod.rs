// SPDX-License-Identifier: GPL-3.0-only

//! Per-target compositing channels
//!
//! Each registered target gets its own channel: a dedicated thread owning a
//! graphics context that draws the newest decoded frame, rotated, onto the
//! target. Two tiers exist:
//!
//! - [`RenderChannel`]: attaches directly to the target
//! - [`RelayChannel`]: renders off-screen and keeps retrying the attachment
//!
//! Graphics contexts come from a [`GraphicsBackend`]: [`WgpuBackend`] on
//! real hardware, [`SoftwareBackend`] everywhere else.

mod channel;
pub mod graphics;
pub mod input;
pub mod relay;
pub mod render;
pub mod software;
pub mod thread;
pub mod transform;
pub mod wgpu_context;

pub use channel::{Compositor, CompositorTier};
pub use graphics::{GraphicsBackend, GraphicsContext, ReleaseStage};
pub use input::{FrameListener, InputSurface};
pub use relay::RelayChannel;
pub use render::RenderChannel;
pub use software::{BackendStats, SoftwareBackend};
pub use thread::{Completer, Promise, promise};
pub use transform::{Mat4, Viewport, normalize_degrees, rotation_matrix};
pub use wgpu_context::WgpuBackend;

use std::sync::Arc;
use tracing::{info, warn};

/// Pick the GPU backend when an adapter exists, else the CPU rasterizer
pub fn default_backend(prefer_gpu: bool) -> Arc<dyn GraphicsBackend> {
    if prefer_gpu {
        match WgpuBackend::new() {
            Ok(backend) => {
                info!(adapter = %backend.info().adapter_name, "Using GPU compositor backend");
                return Arc::new(backend);
            }
            Err(e) => warn!(error = %e, "GPU backend unavailable, using software compositor"),
        }
    }
    Arc::new(SoftwareBackend::new())
}
