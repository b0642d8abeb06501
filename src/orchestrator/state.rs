//! Per-service lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a service within one run.
///
/// `Pending → Starting → Probing → {Ready | Failed}`; a failed start may also
/// go straight from `Starting` to `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not started yet.
    #[default]
    Pending,
    /// Start action issued.
    Starting,
    /// Waiting for the readiness check to pass.
    Probing,
    /// Readiness check passed.
    Ready,
    /// Start failed, attempts exhausted or cancelled.
    Failed,
}

impl ServiceState {
    /// Whether the state is final for the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Ready | ServiceState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Probing)
                | (Starting, Failed)
                | (Probing, Ready)
                | (Probing, Failed)
        )
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Pending => write!(f, "pending"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Probing => write!(f, "probing"),
            ServiceState::Ready => write!(f, "ready"),
            ServiceState::Failed => write!(f, "failed"),
        }
    }
}
