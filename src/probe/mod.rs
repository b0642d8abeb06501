//! Probe module - Readiness checks and the probers that run them.
//!
//! A prober answers one question per attempt: does the service accept work
//! yet? Unreachable targets are an ordinary "not yet" answer; only a check
//! that cannot be executed as written is an error.

pub mod check;
mod system;


use crate::error::Result;
use async_trait::async_trait;

pub use check::ReadinessCheck;
pub use system::{ProbeTimeouts, SystemProber};

/// Answer of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service accepts work.
    Ready,
    /// Not ready yet; `reason` is kept for the final report.
    NotReady { reason: String },
}

impl ProbeOutcome {
    /// Creates a not-ready outcome.
    pub fn not_ready(reason: impl Into<String>) -> Self {
        ProbeOutcome::NotReady {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready)
    }

    /// The not-ready reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Ready => None,
            ProbeOutcome::NotReady { reason } => Some(reason),
        }
    }
}

/// Runs readiness checks.
///
/// Implementations must not keep state that changes the answer for a given
/// check other than the observed external world; `attempt` (1-based) is
/// informational.
#[async_trait]
pub trait ReadinessProber: Send + Sync {
    /// Probes once.
    ///
    /// Returns `Err` only for malformed checks; refused connections,
    /// timeouts and non-zero exits are `Ok(ProbeOutcome::NotReady)`.
    async fn probe(&self, check: &ReadinessCheck, attempt: u32) -> Result<ProbeOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_outcome_accessors() {
        assert!(ProbeOutcome::Ready.is_ready());
        assert_eq!(ProbeOutcome::Ready.reason(), None);

        let outcome = ProbeOutcome::not_ready("connection refused");
        assert!(!outcome.is_ready());
        assert_eq!(outcome.reason(), Some("connection refused"));
    }
}
