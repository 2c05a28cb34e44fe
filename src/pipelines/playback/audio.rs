// SPDX-License-Identifier: MPL-2.0

//! Single audio owner across all players

use crate::backends::capture::TargetRole;
use std::sync::Mutex;
use tracing::debug;

/// Grants unmuted playback to at most one target at a time
#[derive(Debug, Default)]
pub struct AudioGate {
    owner: Mutex<Option<TargetRole>>,
}

impl AudioGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim audio for `role`; `false` when another target already plays sound
    pub fn acquire(&self, role: TargetRole) -> bool {
        let Ok(mut owner) = self.owner.lock() else {
            return false;
        };
        match *owner {
            Some(current) if current != role => {
                debug!(requested = %role, owner = %current, "Audio already taken");
                false
            }
            _ => {
                *owner = Some(role);
                true
            }
        }
    }

    /// Give audio back if `role` holds it
    pub fn release(&self, role: TargetRole) {
        if let Ok(mut owner) = self.owner.lock()
            && *owner == Some(role)
        {
            *owner = None;
        }
    }

    pub fn owner(&self) -> Option<TargetRole> {
        self.owner.lock().ok().and_then(|o| *o)
    }

    pub fn clear(&self) {
        if let Ok(mut owner) = self.owner.lock() {
            *owner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_refused_until_release() {
        let gate = AudioGate::new();
        assert!(gate.acquire(TargetRole::PreviewPrimary));
        assert!(gate.acquire(TargetRole::PreviewPrimary));
        assert!(!gate.acquire(TargetRole::PreviewSecondary));

        // Releasing a non-owner changes nothing
        gate.release(TargetRole::PreviewSecondary);
        assert_eq!(gate.owner(), Some(TargetRole::PreviewPrimary));

        gate.release(TargetRole::PreviewPrimary);
        assert!(gate.acquire(TargetRole::PreviewSecondary));
    }
}
