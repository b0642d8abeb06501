//! Run results and the orchestration report.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::state::ServiceState;
use crate::error::{exit_code, ErrorReport, Result, ServiceError};

/// One probe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub ready: bool,
    /// Not-ready reason or probe error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one service in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub service: String,
    pub state: ServiceState,
    /// Whether the start action returned successfully.
    pub started: bool,
    pub ready: bool,
    /// Number of probe attempts made.
    pub attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    #[serde(serialize_with = "serialize_error")]
    pub last_error: Option<ServiceError>,
    pub probes: Vec<ProbeRecord>,
    /// Whether cleanup ran successfully after a halt.
    pub cleaned_up: bool,
}

fn serialize_millis<S: Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

fn serialize_error<S: Serializer>(
    error: &Option<ServiceError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    error.as_ref().map(ErrorReport::from).serialize(serializer)
}

impl RunResult {
    /// A service that was never started.
    pub fn pending(service: impl Into<String>, reason: Option<ServiceError>) -> Self {
        Self {
            service: service.into(),
            state: ServiceState::Pending,
            started: false,
            ready: false,
            attempts: 0,
            elapsed: Duration::ZERO,
            last_error: reason,
            probes: Vec::new(),
            cleaned_up: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ServiceState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state == ServiceState::Failed
    }
}

impl fmt::Display for RunResult {
    /// `web: ready after 3 attempt(s) in 4.0s`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.state)?;
        if self.started || self.attempts > 0 {
            write!(
                f,
                " after {} attempt(s) in {:.1}s",
                self.attempts,
                self.elapsed.as_secs_f64()
            )?;
        }
        if self.cleaned_up {
            write!(f, " (cleaned up)")?;
        }
        if let Some(error) = &self.last_error {
            write!(f, " [{}] {}", error.code(), error)?;
        }
        Ok(())
    }
}

/// Everything that happened in one run.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Layers in the order they were walked.
    pub layers: Vec<Vec<String>>,
    /// One entry per service in the graph.
    pub results: BTreeMap<String, RunResult>,
    /// True iff every service is ready.
    pub overall_ok: bool,
    /// Whether the run was cancelled by the caller.
    pub cancelled: bool,
}

impl OrchestrationReport {
    pub fn get(&self, service: &str) -> Option<&RunResult> {
        self.results.get(service)
    }

    /// Results in layer order.
    pub fn ordered_results(&self) -> impl Iterator<Item = &RunResult> {
        self.layers
            .iter()
            .flatten()
            .filter_map(|name| self.results.get(name))
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> i32 {
        if self.overall_ok {
            exit_code::SUCCESS
        } else {
            exit_code::READINESS_FAILURE
        }
    }

    /// One status line per service, in layer order.
    pub fn status_lines(&self) -> Vec<String> {
        self.ordered_results().map(ToString::to_string).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
