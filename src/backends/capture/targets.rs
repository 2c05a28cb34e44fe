// SPDX-License-Identifier: MPL-2.0

//! Role-slot table of tracked capture targets

use super::surface::{SurfaceId, TargetSurface};
use std::sync::Arc;
use tracing::debug;

/// Role of a tracked target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    PreviewPrimary,
    PreviewSecondary,
    ReaderPrimary,
    ReaderSecondary,
}

impl TargetRole {
    /// Playback and lookup order: previews before readers, primary first
    pub const ALL: [TargetRole; 4] = [
        TargetRole::PreviewPrimary,
        TargetRole::PreviewSecondary,
        TargetRole::ReaderPrimary,
        TargetRole::ReaderSecondary,
    ];

    pub fn is_reader(&self) -> bool {
        matches!(self, TargetRole::ReaderPrimary | TargetRole::ReaderSecondary)
    }

    pub fn index(&self) -> usize {
        match self {
            TargetRole::PreviewPrimary => 0,
            TargetRole::PreviewSecondary => 1,
            TargetRole::ReaderPrimary => 2,
            TargetRole::ReaderSecondary => 3,
        }
    }

    /// Tag naming the player bound to this slot
    pub fn tag(&self) -> &'static str {
        match self {
            TargetRole::PreviewPrimary => "preview",
            TargetRole::PreviewSecondary => "preview-1",
            TargetRole::ReaderPrimary => "reader",
            TargetRole::ReaderSecondary => "reader-1",
        }
    }

    fn slots_for(reader: bool) -> [TargetRole; 2] {
        if reader {
            [TargetRole::ReaderPrimary, TargetRole::ReaderSecondary]
        } else {
            [TargetRole::PreviewPrimary, TargetRole::PreviewSecondary]
        }
    }
}

impl std::fmt::Display for TargetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Anonymous surfaces are still-image or analysis readers; named ones are previews
pub fn is_reader_surface(target: &dyn TargetSurface) -> bool {
    target.name().is_none()
}

/// Outcome of [`TargetTable::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added(TargetRole),
    AlreadyTracked(TargetRole),
    /// Both slots of the role are taken; the target is not tracked
    Ignored,
}

/// Four role slots, at most two targets per role
#[derive(Default, Clone)]
pub struct TargetTable {
    slots: [Option<Arc<dyn TargetSurface>>; 4],
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a target in the first empty slot of its role
    pub fn register(&mut self, target: Arc<dyn TargetSurface>) -> Registration {
        if let Some(role) = self.role_of(target.id()) {
            return Registration::AlreadyTracked(role);
        }
        let reader = is_reader_surface(target.as_ref());
        for role in TargetRole::slots_for(reader) {
            let slot = &mut self.slots[role.index()];
            if slot.is_none() {
                debug!(role = %role, target_surface = %target.describe(), "Target tracked");
                *slot = Some(target);
                return Registration::Added(role);
            }
        }
        debug!(target_surface = %target.describe(), "Role slots full, target ignored");
        Registration::Ignored
    }

    /// Clear whichever slot holds the target; `None` if it was not tracked
    pub fn remove(&mut self, id: SurfaceId) -> Option<TargetRole> {
        let role = self.role_of(id)?;
        self.slots[role.index()] = None;
        Some(role)
    }

    pub fn get(&self, role: TargetRole) -> Option<&Arc<dyn TargetSurface>> {
        self.slots[role.index()].as_ref()
    }

    pub fn role_of(&self, id: SurfaceId) -> Option<TargetRole> {
        TargetRole::ALL
            .into_iter()
            .find(|role| self.slots[role.index()].as_ref().is_some_and(|t| t.id() == id))
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.role_of(id).is_some()
    }

    /// Tracked targets in role order
    pub fn iter(&self) -> impl Iterator<Item = (TargetRole, &Arc<dyn TargetSurface>)> {
        TargetRole::ALL
            .into_iter()
            .filter_map(|role| self.get(role).map(|t| (role, t)))
    }

    pub fn snapshot(&self) -> Vec<(TargetRole, Arc<dyn TargetSurface>)> {
        self.iter().map(|(role, t)| (role, Arc::clone(t))).collect()
    }

    pub fn ids(&self) -> Vec<Option<SurfaceId>> {
        self.slots.iter().map(|s| s.as_ref().map(|t| t.id())).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

impl std::fmt::Debug for TargetTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(role, t)| (role, t.describe())))
            .finish()
    }
}
