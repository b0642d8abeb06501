//! Exec backend implementation.
//!
//! This backend runs the `start` and `cleanup` command lines declared on each
//! service. The resolved deployment environment is passed to every command,
//! with the service's own `env` entries taking precedence.

use crate::config::{Environment, ServiceDefinition};
use crate::error::{JunbanError, Result};
use crate::service::backend::{ServiceAction, ServiceBackend};
use crate::service::command::{CommandRunner, CommandSpec, DEFAULT_COMMAND_TIMEOUT_SECS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Exec backend for service operations.
pub struct ExecBackend {
    /// Service definitions from configuration.
    services: HashMap<String, ServiceDefinition>,
    /// Environment shared by all commands.
    environment: Environment,
    /// Process runner.
    runner: Arc<dyn CommandRunner>,
}

impl ExecBackend {
    /// Creates a new exec backend.
    pub fn new(
        services: impl IntoIterator<Item = ServiceDefinition>,
        environment: Environment,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let services = services
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();
        Self {
            services,
            environment,
            runner,
        }
    }

    /// Gets the service definition for a service.
    fn get_service(&self, name: &str) -> Result<&ServiceDefinition> {
        self.services
            .get(name)
            .ok_or_else(|| JunbanError::backend(format!("No exec definition for service '{}'", name)))
    }

    /// Builds the invocation for one of the service's command lines.
    fn command_spec(&self, definition: &ServiceDefinition, command: &str) -> Result<CommandSpec> {
        let timeout = definition.timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
        let spec = CommandSpec::parse(command)?
            .working_dir(definition.working_dir.clone())
            .envs(self.environment.iter())
            .envs(definition.env_pairs())
            .timeout(Duration::from_secs(timeout));
        Ok(spec)
    }

    async fn execute(&self, service: &str, action: ServiceAction, command: &str) -> Result<()> {
        let definition = self.get_service(service)?;
        let spec = self.command_spec(definition, command)?;

        info!(service = service, action = %action, command = %spec.display(), "Running service command");

        let output = self.runner.run(&spec).await?;
        if !output.success {
            error!(
                service = service,
                action = %action,
                output = %output.output,
                "Service command failed"
            );
            return Err(JunbanError::backend(format!(
                "{} command `{}` {}",
                action,
                spec.display(),
                output.failure_reason()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ServiceBackend for ExecBackend {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn has_cleanup(&self, service: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|def| def.cleanup.is_some())
    }

    async fn start(&self, service: &str) -> Result<()> {
        let command = self
            .get_service(service)?
            .start
            .clone()
            .ok_or_else(|| {
                JunbanError::backend(format!("Service '{}' has no start command", service))
            })?;
        self.execute(service, ServiceAction::Start, &command).await
    }

    async fn cleanup(&self, service: &str) -> Result<()> {
        let command = self
            .get_service(service)?
            .cleanup
            .clone()
            .ok_or_else(|| {
                JunbanError::backend(format!("Service '{}' has no cleanup command", service))
            })?;
        self.execute(service, ServiceAction::Cleanup, &command).await
    }
}
