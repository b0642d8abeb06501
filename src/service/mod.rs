//! Service module - Start backends and process execution.
//!
//! This module provides the start side of orchestration: the backend trait,
//! implementations for exec and compose backends, and the command runner
//! they share with the command readiness probe.

pub mod backend;
pub mod command;
pub mod compose;
pub mod exec;


use crate::config::{Backend, Config, Environment};
use crate::error::{JunbanError, Result};
use compose::ComposeBackend;
use exec::ExecBackend;
use std::sync::Arc;

// Re-exports for convenience
pub use backend::{ServiceAction, ServiceBackend};
pub use command::{
    CommandOutput, CommandRunner, CommandSpec, ProcessRunner, DEFAULT_COMMAND_TIMEOUT_SECS,
};

/// Creates the start backend selected by configuration.
pub fn create_backend(
    config: &Config,
    environment: Environment,
    runner: Arc<dyn CommandRunner>,
) -> Result<Arc<dyn ServiceBackend>> {
    match config.backend.kind {
        Backend::Compose => Ok(Arc::new(ComposeBackend::new(
            config.backend.compose.clone(),
            environment,
            runner,
        ))),
        Backend::Exec => {
            if let Some(def) = config.services.iter().find(|def| def.start.is_none()) {
                return Err(JunbanError::config(format!(
                    "Exec backend requires a start command for service '{}'",
                    def.name
                )));
            }
            Ok(Arc::new(ExecBackend::new(
                config.services.clone(),
                environment,
                runner,
            )))
        }
    }
}
