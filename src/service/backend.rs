//! Service backend trait and common types.
//!
//! A backend is the start collaborator of the orchestrator: it knows how to
//! bring a named service up and, optionally, how to take it down again when
//! a run halts. It knows nothing about readiness or ordering.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Action performed by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    /// Bring the service up.
    Start,
    /// Take the service down after a halted run.
    Cleanup,
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Trait for service backends.
///
/// `start` may return before the service is able to accept work; readiness
/// is decided by probing, never by the backend.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &'static str;

    /// Whether a cleanup action is registered for the service.
    fn has_cleanup(&self, service: &str) -> bool;

    /// Starts a service.
    async fn start(&self, service: &str) -> Result<()>;

    /// Runs the registered cleanup action for a service.
    async fn cleanup(&self, service: &str) -> Result<()>;
}
