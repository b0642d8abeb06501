//! Start and readiness polling of a single service.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::report::{ProbeRecord, RunResult};
use super::state::ServiceState;
use crate::config::{OrchestratorConfig, StartFailurePolicy};
use crate::error::ServiceError;
use crate::graph::Service;
use crate::probe::{ProbeOutcome, ReadinessProber};
use crate::service::ServiceBackend;

/// Everything a service task needs; cloned into each spawned task.
#[derive(Clone)]
pub(crate) struct Lifecycle {
    pub(crate) backend: Arc<dyn ServiceBackend>,
    pub(crate) prober: Arc<dyn ReadinessProber>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) cancel: CancellationToken,
}

/// Mutable run record of one service; frozen into a [`RunResult`] at the end.
struct Tracker {
    result: RunResult,
    began: Instant,
}

impl Tracker {
    fn new(service: &str) -> Self {
        Self {
            result: RunResult::pending(service, None),
            began: Instant::now(),
        }
    }

    fn transition(&mut self, next: ServiceState) {
        let current = self.result.state;
        if !current.can_transition_to(next) {
            warn!(service = %self.result.service, from = %current, to = %next, "Unexpected state transition");
        }
        debug!(service = %self.result.service, from = %current, to = %next, "State transition");
        self.result.state = next;
    }

    fn record(&mut self, attempt: u32, ready: bool, error: Option<String>) {
        self.result.attempts = attempt;
        self.result.probes.push(ProbeRecord {
            attempt,
            at: Utc::now(),
            ready,
            error,
        });
    }

    fn finish(mut self, state: ServiceState, error: Option<ServiceError>) -> RunResult {
        self.transition(state);
        self.result.ready = state == ServiceState::Ready;
        self.result.last_error = error;
        self.result.elapsed = self.began.elapsed();
        self.result
    }
}

impl Lifecycle {
    /// Starts `service` and polls its readiness check until it passes, the
    /// attempts run out or the run is cancelled.
    pub(crate) async fn drive(self, service: Service) -> RunResult {
        let name = service.name().to_string();
        let mut tracker = Tracker::new(&name);

        tracker.transition(ServiceState::Starting);
        info!(service = %name, backend = self.backend.name(), "Starting service");

        let mut max_attempts = service.max_attempts();
        let mut start_error = None;
        match self.backend.start(&name).await {
            Ok(()) => tracker.result.started = true,
            Err(e) => {
                let error = ServiceError::Start {
                    service: name.clone(),
                    message: e.to_string(),
                };
                warn!(service = %name, error = %e, "Start action failed");
                match self.config.start_failure {
                    StartFailurePolicy::FailFast => {
                        return tracker.finish(ServiceState::Failed, Some(error));
                    }
                    StartFailurePolicy::ProbeOnce => {
                        max_attempts = 1;
                        start_error = Some(error);
                    }
                }
            }
        }

        tracker.transition(ServiceState::Probing);
        let check = service.readiness();
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return self.cancelled(tracker, &name, attempt - 1);
            }

            match self.prober.probe(check, attempt).await {
                Ok(ProbeOutcome::Ready) => {
                    tracker.record(attempt, true, None);
                    info!(service = %name, attempt = attempt, "Service is ready");
                    return tracker.finish(ServiceState::Ready, start_error);
                }
                Ok(ProbeOutcome::NotReady { reason }) => {
                    debug!(
                        service = %name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        reason = %reason,
                        "Service not ready yet"
                    );
                    tracker.record(attempt, false, Some(reason.clone()));
                    last_failure = reason;
                }
                Err(e) => {
                    tracker.record(attempt, false, Some(e.to_string()));
                    warn!(service = %name, error = %e, "Readiness check cannot be executed");
                    let error = ServiceError::InvalidProbe {
                        service: name.clone(),
                        message: e.to_string(),
                    };
                    return tracker.finish(ServiceState::Failed, Some(error));
                }
            }

            let delay = self
                .config
                .backoff
                .delay(service.retry_interval(), attempt);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.cancelled(tracker, &name, attempt);
                }
                _ = sleep(delay) => {}
            }
        }

        warn!(
            service = %name,
            attempts = max_attempts,
            last_failure = %last_failure,
            "Service did not become ready"
        );
        let error = start_error.unwrap_or(ServiceError::ProbeTimeout {
            service: name.clone(),
            attempts: max_attempts,
            last_failure,
        });
        tracker.finish(ServiceState::Failed, Some(error))
    }

    fn cancelled(&self, tracker: Tracker, name: &str, attempts: u32) -> RunResult {
        info!(service = %name, attempts = attempts, "Readiness polling cancelled");
        let error = ServiceError::Cancelled {
            service: name.to_string(),
            attempts,
        };
        tracker.finish(ServiceState::Failed, Some(error))
    }
}
