//! Configuration module for junban.
//!
//! A configuration file is a YAML document describing the services to deploy,
//! how each one is started and how its readiness is detected, plus logging,
//! backoff and backend settings.

mod backend;
mod environment;
mod logging;
mod retry;
mod service;

pub use backend::{Backend, BackendConfig, ComposeConfig};
pub use environment::Environment;
pub use logging::{LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use retry::{
    BackoffConfig, BackoffStrategy, OrchestratorConfig, StartFailurePolicy, TimeoutConfig,
};
pub use service::{ServiceDefinition, DEFAULT_MAX_WAIT_SECS, DEFAULT_RETRY_INTERVAL_SECS};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{GraphError, JunbanError};
use crate::graph::ServiceGraph;
use crate::service::CommandSpec;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Orchestrator behaviour.
    pub orchestrator: OrchestratorConfig,

    /// Probe timeouts.
    pub probe: TimeoutConfig,

    /// Start backend.
    pub backend: BackendConfig,

    /// Base environment handed to every start and cleanup action.
    pub environment: BTreeMap<String, String>,

    /// Named environment overrides, e.g. one per application fork.
    pub variants: BTreeMap<String, BTreeMap<String, String>>,

    /// Variant selected when none is given on the command line.
    pub variant: Option<String>,

    /// Services to deploy.
    pub services: Vec<ServiceDefinition>,
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, JunbanError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            JunbanError::config_with_source(
                format!("Failed to read config file '{}'", path.as_ref().display()),
                e,
            )
        })?;

        Self::load_from_str(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self, JunbanError> {
        let config: Config = serde_yaml::from_str(content)?;

        config.validate()?;
        Ok(config)
    }

    /// Validates field values.
    ///
    /// Graph structure (duplicates, unknown dependencies, cycles) is checked
    /// separately by [`ServiceGraph::validate`].
    pub fn validate(&self) -> Result<(), JunbanError> {
        if self.services.is_empty() {
            return Err(JunbanError::config("services must not be empty"));
        }

        for def in &self.services {
            let name = def.name.as_str();
            if name.trim().is_empty() {
                return Err(JunbanError::config("services[].name must not be empty"));
            }
            if def.max_wait_seconds == 0 {
                return Err(JunbanError::config(format!(
                    "services.{}.max_wait_seconds must be > 0",
                    name
                )));
            }
            if def.retry_interval_seconds == 0 {
                return Err(JunbanError::config(format!(
                    "services.{}.retry_interval_seconds must be > 0",
                    name
                )));
            }
            def.readiness.validate().map_err(|e| {
                JunbanError::config(format!("services.{}.readiness: {}", name, e))
            })?;

            if self.backend.kind == Backend::Exec {
                let start = def.start.as_deref().unwrap_or_default();
                if start.trim().is_empty() {
                    return Err(JunbanError::config(format!(
                        "services.{}.start is required when using exec backend",
                        name
                    )));
                }
            }
            for (field, command) in [("start", &def.start), ("cleanup", &def.cleanup)] {
                if let Some(command) = command {
                    CommandSpec::parse(command).map_err(|e| {
                        JunbanError::config(format!("services.{}.{}: {}", name, field, e))
                    })?;
                }
            }
            if let Some(bad) = def.env.iter().find(|entry| !entry.contains('=')) {
                return Err(JunbanError::config(format!(
                    "services.{}.env entry '{}' must be KEY=VALUE",
                    name, bad
                )));
            }
        }

        if let Some(variant) = &self.variant {
            if !self.variants.contains_key(variant) {
                return Err(JunbanError::config(format!(
                    "variant '{}' is not defined in variants",
                    variant
                )));
            }
        }

        if self.backend.kind == Backend::Compose && self.backend.compose.program.trim().is_empty()
        {
            return Err(JunbanError::config("backend.compose.program must not be empty"));
        }

        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(JunbanError::config(
                "logging.file_path is required when output is file",
            ));
        }

        let backoff = &self.orchestrator.backoff;
        if backoff.strategy == BackoffStrategy::Exponential
            && (backoff.multiplier.is_nan() || backoff.multiplier < 1.0)
        {
            return Err(JunbanError::config(
                "orchestrator.backoff.multiplier must be >= 1.0",
            ));
        }

        if self.probe.tcp_ms == 0 || self.probe.http_ms == 0 || self.probe.command_seconds == 0 {
            return Err(JunbanError::config("probe timeouts must be > 0"));
        }

        Ok(())
    }

    /// Merges the base environment with the selected variant.
    ///
    /// `selected` (from the command line) takes precedence over the
    /// `variant` key of the file.
    pub fn resolve_environment(&self, selected: Option<&str>) -> Result<Environment, JunbanError> {
        let variant = selected.or(self.variant.as_deref());
        let mut vars = self.environment.clone();

        if let Some(name) = variant {
            let overrides = self.variants.get(name).ok_or_else(|| {
                let available: Vec<&str> = self.variants.keys().map(String::as_str).collect();
                JunbanError::config(format!(
                    "Unknown variant '{}' (available: {})",
                    name,
                    if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    }
                ))
            })?;
            vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Ok(Environment::new(variant.map(str::to_string), vars))
    }

    /// Builds the service graph, rejecting duplicate names.
    pub fn build_graph(&self) -> Result<ServiceGraph, GraphError> {
        let mut graph = ServiceGraph::new();
        for def in &self.services {
            graph.add_service(def.to_service())?;
        }
        Ok(graph)
    }

    /// Looks up a service definition by name.
    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|def| def.name == name)
    }
}
