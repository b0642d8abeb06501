//! Service definitions as they appear in the configuration file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::graph::Service;
use crate::probe::ReadinessCheck;

/// Default readiness window in seconds.
pub const DEFAULT_MAX_WAIT_SECS: u64 = 60;

/// Default delay between probe attempts in seconds.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 2;

fn default_max_wait() -> u64 {
    DEFAULT_MAX_WAIT_SECS
}

fn default_retry_interval() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

/// One deployable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Unique service name (also the compose service name).
    pub name: String,

    /// Services that must be ready before this one starts.
    #[serde(default, alias = "dependsOn")]
    pub depends_on: Vec<String>,

    /// How readiness is detected.
    pub readiness: ReadinessCheck,

    /// Total readiness window in seconds.
    #[serde(default = "default_max_wait", alias = "maxWaitSeconds")]
    pub max_wait_seconds: u64,

    /// Delay between probe attempts in seconds.
    #[serde(default = "default_retry_interval", alias = "retryIntervalSeconds")]
    pub retry_interval_seconds: u64,

    /// Start command (exec backend).
    #[serde(default)]
    pub start: Option<String>,

    /// Cleanup command run on halt (exec backend).
    #[serde(default)]
    pub cleanup: Option<String>,

    /// Working directory for start/cleanup commands.
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Extra environment variables, `KEY=VALUE`.
    #[serde(default)]
    pub env: Vec<String>,

    /// Start/cleanup command timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ServiceDefinition {
    /// Creates a definition with defaults for everything but name and check.
    pub fn new(name: impl Into<String>, readiness: ReadinessCheck) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            readiness,
            max_wait_seconds: DEFAULT_MAX_WAIT_SECS,
            retry_interval_seconds: DEFAULT_RETRY_INTERVAL_SECS,
            start: None,
            cleanup: None,
            working_dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Builds the graph node for this definition.
    pub fn to_service(&self) -> Service {
        Service::new(self.name.clone(), self.readiness.clone())
            .with_dependencies(self.depends_on.iter().cloned())
            .with_max_wait(Duration::from_secs(self.max_wait_seconds))
            .with_retry_interval(Duration::from_secs(self.retry_interval_seconds))
    }

    /// Parses the `KEY=VALUE` entries of `env`, skipping malformed ones.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }
}
