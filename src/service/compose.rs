//! Compose backend implementation.
//!
//! This backend drives a container runtime's `compose` subcommand
//! (`docker compose`, `podman compose`). A service name in the configuration
//! is the compose service name.

use crate::config::{ComposeConfig, Environment};
use crate::error::{JunbanError, Result};
use crate::service::backend::{ServiceAction, ServiceBackend};
use crate::service::command::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Compose backend for service operations.
pub struct ComposeBackend {
    config: ComposeConfig,
    environment: Environment,
    runner: Arc<dyn CommandRunner>,
}

impl ComposeBackend {
    /// Creates a new compose backend.
    pub fn new(
        config: ComposeConfig,
        environment: Environment,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            environment,
            runner,
        }
    }

    /// Builds `<program> compose [-f file] [-p project] <args...>`.
    fn compose_command(&self, args: &[&str]) -> CommandSpec {
        let mut spec = CommandSpec::new(self.config.program.clone()).args(["compose"]);
        if let Some(file) = &self.config.file {
            spec = spec.args(["-f", file.as_str()]);
        }
        if let Some(project) = &self.config.project {
            spec = spec.args(["-p", project.as_str()]);
        }
        spec.args(args.iter().copied())
            .working_dir(self.config.project_dir.clone())
            .envs(self.environment.iter())
            .timeout(Duration::from_secs(self.config.timeout_seconds))
    }

    /// Executes a compose command; a non-zero exit is an error.
    async fn compose(&self, service: &str, action: ServiceAction, args: &[&str]) -> Result<()> {
        let spec = self.compose_command(args);
        debug!(service = service, command = %spec.display(), "Executing compose");

        let output = self.runner.run(&spec).await?;
        if !output.success {
            error!(
                service = service,
                action = %action,
                output = %output.output,
                "Compose command failed"
            );
            return Err(JunbanError::backend(format!(
                "`{}` {}",
                spec.display(),
                output.failure_reason()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ServiceBackend for ComposeBackend {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn has_cleanup(&self, _service: &str) -> bool {
        self.config.stop_on_cleanup
    }

    async fn start(&self, service: &str) -> Result<()> {
        info!(service = service, "Starting service via compose");
        self.compose(service, ServiceAction::Start, &["up", "-d", service])
            .await
    }

    async fn cleanup(&self, service: &str) -> Result<()> {
        info!(service = service, "Stopping service via compose");
        self.compose(service, ServiceAction::Cleanup, &["stop", service])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;
    use std::collections::BTreeMap;

    fn backend(config: ComposeConfig, runner: Arc<MockRunner>) -> ComposeBackend {
        let env = Environment::new(
            Some("ngt".to_string()),
            BTreeMap::from([("SIGNBANK_REPO".to_string(), "ngt".to_string())]),
        );
        ComposeBackend::new(config, env, runner)
    }

    #[tokio::test]
    async fn test_start_runs_compose_up() {
        let runner = Arc::new(MockRunner::new());
        let config = ComposeConfig {
            file: Some("deploy/compose.yml".to_string()),
            project: Some("signbank".to_string()),
            project_dir: Some("/srv/signbank".to_string()),
            timeout_seconds: 90,
            ..Default::default()
        };
        let backend = backend(config, runner.clone());

        backend.start("web").await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].display(),
            "docker compose -f deploy/compose.yml -p signbank up -d web"
        );
        assert_eq!(calls[0].working_dir.as_deref(), Some("/srv/signbank"));
        assert_eq!(calls[0].timeout, Duration::from_secs(90));
        assert!(calls[0]
            .env
            .contains(&("SIGNBANK_REPO".to_string(), "ngt".to_string())));
    }

    #[tokio::test]
    async fn test_cleanup_runs_compose_stop() {
        let runner = Arc::new(MockRunner::new());
        let config = ComposeConfig {
            program: "podman".to_string(),
            ..Default::default()
        };
        let backend = backend(config, runner.clone());

        assert!(backend.has_cleanup("db"));
        backend.cleanup("db").await.unwrap();

        assert_eq!(runner.calls()[0].display(), "podman compose stop db");
    }

    #[tokio::test]
    async fn test_failed_compose_is_backend_error() {
        let runner = Arc::new(MockRunner::new());
        runner.fail("docker", 1, "no such service: web");
        let backend = backend(ComposeConfig::default(), runner);

        let err = backend.start("web").await.unwrap_err();
        assert!(matches!(err, JunbanError::Backend { .. }));
        assert!(err.to_string().contains("no such service: web"));
    }

    #[test]
    fn test_cleanup_disabled() {
        let config = ComposeConfig {
            stop_on_cleanup: false,
            ..Default::default()
        };
        let backend = backend(config, Arc::new(MockRunner::new()));
        assert!(!backend.has_cleanup("db"));
    }
}
