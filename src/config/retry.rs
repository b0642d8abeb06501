//! Probe retry, timeout and failure-policy configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator behaviour configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Delay schedule between probe attempts.
    pub backoff: BackoffConfig,

    /// What to do when a start action returns an error.
    pub start_failure: StartFailurePolicy,

    /// Run registered cleanup on ready services when a layer fails.
    pub cleanup_on_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            start_failure: StartFailurePolicy::FailFast,
            cleanup_on_failure: true,
        }
    }
}

/// Policy for a start action that returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartFailurePolicy {
    /// Mark the service failed without probing.
    #[default]
    FailFast,

    /// Record the error, then probe exactly once in case the start signal
    /// was unreliable.
    ProbeOnce,
}

/// Backoff strategy between probe attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Always wait the service's retry interval.
    #[default]
    Fixed,

    /// Multiply the retry interval after every failed attempt.
    Exponential,
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Backoff strategy.
    pub strategy: BackoffStrategy,

    /// Backoff multiplier (exponential only).
    pub multiplier: f64,

    /// Upper bound on a single delay in seconds (exponential only).
    pub max_interval_seconds: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            multiplier: 2.0,
            max_interval_seconds: 30,
        }
    }
}

impl BackoffConfig {
    /// Exponential backoff with the default multiplier and cap.
    pub fn exponential() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, interval: Duration, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => interval,
            BackoffStrategy::Exponential => {
                let cap = Duration::from_secs(self.max_interval_seconds).max(interval);
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = interval.as_secs_f64() * self.multiplier.powi(exponent);
                if secs.is_finite() && secs < cap.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    cap
                }
            }
        }
    }
}

/// Per-attempt timeouts for the readiness probe primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout in milliseconds.
    pub tcp_ms: u64,

    /// HTTP request timeout in milliseconds.
    pub http_ms: u64,

    /// Command probe timeout in seconds.
    pub command_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tcp_ms: 2000,
            http_ms: 2000,
            command_seconds: 10,
        }
    }
}
