//! Error types and error handling for junban.
//!
//! This module defines the crate-level error, the graph validation errors that
//! abort a run before anything starts, the per-service errors recorded in the
//! orchestration report, and the CLI exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes attached to every error that can appear in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// E001: Configuration file is invalid
    #[serde(rename = "E001")]
    ConfigInvalid,

    /// E002: Service graph is invalid
    #[serde(rename = "E002")]
    GraphInvalid,

    /// E003: Start action failed
    #[serde(rename = "E003")]
    StartFailed,

    /// E004: Readiness probing exhausted its attempts
    #[serde(rename = "E004")]
    ProbeTimeout,

    /// E005: Orchestration was cancelled
    #[serde(rename = "E005")]
    Cancelled,

    /// E006: Readiness check is malformed
    #[serde(rename = "E006")]
    ProbeInvalid,

    /// E007: Backend operation failed
    #[serde(rename = "E007")]
    BackendError,

    /// E008: Operation timed out
    #[serde(rename = "E008")]
    Timeout,

    /// E009: Service was never started
    #[serde(rename = "E009")]
    NotStarted,
}

impl ErrorCode {
    /// Returns the error code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalid => "E001",
            ErrorCode::GraphInvalid => "E002",
            ErrorCode::StartFailed => "E003",
            ErrorCode::ProbeTimeout => "E004",
            ErrorCode::Cancelled => "E005",
            ErrorCode::ProbeInvalid => "E006",
            ErrorCode::BackendError => "E007",
            ErrorCode::Timeout => "E008",
            ErrorCode::NotStarted => "E009",
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalid => "Configuration file is invalid",
            ErrorCode::GraphInvalid => "Service graph is invalid",
            ErrorCode::StartFailed => "Service failed to start",
            ErrorCode::ProbeTimeout => "Service did not become ready in time",
            ErrorCode::Cancelled => "Orchestration was cancelled",
            ErrorCode::ProbeInvalid => "Readiness check is malformed",
            ErrorCode::BackendError => "Backend operation failed",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::NotStarted => "Service was not started",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CLI exit codes.
pub mod exit_code {
    /// Every service reached ready
    pub const SUCCESS: i32 = 0;
    /// Configuration or graph validation failed; nothing was started
    pub const VALIDATION_ERROR: i32 = 1;
    /// At least one service did not become ready
    pub const READINESS_FAILURE: i32 = 2;
    /// Any other operational failure (runtime setup, I/O)
    pub const GENERAL_ERROR: i32 = 3;
}

/// Structural problems with a service graph.
///
/// These are always reported before any service is started and are never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two services share a name.
    #[error("Duplicate service: {name}")]
    DuplicateService { name: String },

    /// A service depends on a name that is not in the graph.
    #[error("Service '{service}' depends on unknown service '{missing}'")]
    UnknownDependency { service: String, missing: String },

    /// The dependency edges form a cycle. `path` starts and ends on the same
    /// service.
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Failure of a single service within a run.
///
/// Stored as the `last_error` of the service's run result; these never abort
/// the run by themselves, they only halt later layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The start action returned an error.
    #[error("Service '{service}' failed to start: {message}")]
    Start { service: String, message: String },

    /// Every probe attempt came back not-ready.
    #[error("Service '{service}' not ready after {attempts} attempt(s): {last_failure}")]
    ProbeTimeout {
        service: String,
        attempts: u32,
        last_failure: String,
    },

    /// The run was cancelled while the service was being probed.
    #[error("Service '{service}' cancelled after {attempts} probe attempt(s)")]
    Cancelled { service: String, attempts: u32 },

    /// The readiness check could not be executed as configured.
    #[error("Service '{service}' has an invalid readiness check: {message}")]
    InvalidProbe { service: String, message: String },

    /// The service was never started because a dependency is not ready.
    #[error("Service '{service}' not started: dependency '{dependency}' is not ready")]
    DependencyNotReady { service: String, dependency: String },

    /// The service was never started because the run halted first.
    #[error("Service '{service}' not started: orchestration halted")]
    Halted { service: String },
}

impl ServiceError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Start { .. } => ErrorCode::StartFailed,
            ServiceError::ProbeTimeout { .. } => ErrorCode::ProbeTimeout,
            ServiceError::Cancelled { .. } => ErrorCode::Cancelled,
            ServiceError::InvalidProbe { .. } => ErrorCode::ProbeInvalid,
            ServiceError::DependencyNotReady { .. } | ServiceError::Halted { .. } => {
                ErrorCode::NotStarted
            }
        }
    }

    /// Name of the service the error belongs to.
    pub fn service(&self) -> &str {
        match self {
            ServiceError::Start { service, .. }
            | ServiceError::ProbeTimeout { service, .. }
            | ServiceError::Cancelled { service, .. }
            | ServiceError::InvalidProbe { service, .. }
            | ServiceError::DependencyNotReady { service, .. }
            | ServiceError::Halted { service } => service,
        }
    }
}

/// The main error type for junban.
#[derive(Debug, Error)]
pub enum JunbanError {
    /// Configuration file is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Service graph failed validation.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// A readiness check is malformed (bad URL, empty command line).
    #[error("Invalid readiness check: {message}")]
    InvalidProbe { message: String },

    /// Backend operation failed.
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("Timeout: {operation} (waited {seconds}s)")]
    Timeout { operation: String, seconds: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JunbanError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            JunbanError::Config { .. } | JunbanError::Yaml(_) => ErrorCode::ConfigInvalid,
            JunbanError::Graph(_) => ErrorCode::GraphInvalid,
            JunbanError::InvalidProbe { .. } => ErrorCode::ProbeInvalid,
            JunbanError::Backend { .. } | JunbanError::Io(_) | JunbanError::Json(_) => {
                ErrorCode::BackendError
            }
            JunbanError::Timeout { .. } => ErrorCode::Timeout,
        }
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            JunbanError::Config { .. }
            | JunbanError::Yaml(_)
            | JunbanError::Graph(_)
            | JunbanError::InvalidProbe { .. } => exit_code::VALIDATION_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        JunbanError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        JunbanError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a backend error with a message.
    pub fn backend(message: impl Into<String>) -> Self {
        JunbanError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a backend error with a message and source.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        JunbanError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an invalid readiness check error.
    pub fn invalid_probe(message: impl Into<String>) -> Self {
        JunbanError::InvalidProbe {
            message: message.into(),
        }
    }
}

/// Serializable form of a service error, as written into JSON reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code (e.g., "E004").
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,
}

impl ErrorReport {
    /// Creates a new error report.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&ServiceError> for ErrorReport {
    fn from(error: &ServiceError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

/// Result type alias for junban operations.
pub type Result<T> = std::result::Result<T, JunbanError>;
