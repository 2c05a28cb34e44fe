// SPDX-License-Identifier: MPL-2.0

//! Capture request builder as seen by the host

use super::surface::{SurfaceId, TargetSurface};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one request builder instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuilderId(u64);

impl std::fmt::Display for BuilderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "builder#{}", self.0)
    }
}

/// Purpose the host created the request for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

/// Mutable request under construction
///
/// The target list is what the platform will receive: after interception it
/// only ever holds the virtual sink.
pub struct RequestBuilder {
    id: BuilderId,
    template: RequestTemplate,
    targets: Vec<Arc<dyn TargetSurface>>,
}

impl RequestBuilder {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            id: BuilderId(NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed)),
            template,
            targets: Vec::new(),
        }
    }

    pub fn id(&self) -> BuilderId {
        self.id
    }

    pub fn template(&self) -> RequestTemplate {
        self.template
    }

    pub fn targets(&self) -> &[Arc<dyn TargetSurface>] {
        &self.targets
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.targets.iter().any(|t| t.id() == id)
    }

    /// Platform-level add; a target appears at most once
    pub(crate) fn push_target(&mut self, target: Arc<dyn TargetSurface>) {
        if !self.contains(target.id()) {
            self.targets.push(target);
        }
    }

    /// Platform-level remove; no-op for unknown targets
    pub(crate) fn drop_target(&mut self, id: SurfaceId) {
        self.targets.retain(|t| t.id() != id);
    }

    pub(crate) fn to_request(&self) -> CaptureRequest {
        CaptureRequest {
            builder: self.id,
            template: self.template,
            targets: self.targets.clone(),
        }
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("id", &self.id)
            .field("template", &self.template)
            .field(
                "targets",
                &self.targets.iter().map(|t| t.describe()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Finalized request handed to the platform
#[derive(Clone)]
pub struct CaptureRequest {
    pub builder: BuilderId,
    pub template: RequestTemplate,
    pub targets: Vec<Arc<dyn TargetSurface>>,
}

impl CaptureRequest {
    pub fn target_ids(&self) -> Vec<SurfaceId> {
        self.targets.iter().map(|t| t.id()).collect()
    }
}

impl std::fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("builder", &self.builder)
            .field("template", &self.template)
            .field("targets", &self.target_ids())
            .finish()
    }
}
