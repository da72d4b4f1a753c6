//! Phase tracking for a single manager.

use tracing::{debug, info};

use llm_session_core::{LifecycleStatus, ManagerId, Phase};

/// Owns a manager's status; the only place it is mutated.
#[derive(Debug)]
pub(crate) struct StatusTracker {
    id: ManagerId,
    current: LifecycleStatus,
}

impl StatusTracker {
    pub(crate) fn new(id: ManagerId) -> Self {
        Self {
            id,
            current: LifecycleStatus::default(),
        }
    }

    pub(crate) fn current(&self) -> &LifecycleStatus {
        &self.current
    }

    pub(crate) fn phase(&self) -> Phase {
        self.current.phase
    }

    /// Move to `phase` with an explicit message.
    pub(crate) fn set(&mut self, phase: Phase, message: impl Into<String>) {
        let old = self.current.phase;
        self.current = LifecycleStatus::new(phase, message);
        if old != phase {
            info!(
                "Lifecycle phase changed: id={}, {:?} → {:?}",
                self.id, old, phase
            );
        } else {
            debug!(
                "Lifecycle status updated: id={}, {:?}, {:?}",
                self.id, phase, self.current.message
            );
        }
    }

    /// Move to `phase` with its default message.
    pub(crate) fn set_default(&mut self, phase: Phase) {
        self.set(phase, phase.default_message());
    }
}
