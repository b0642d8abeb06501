//! Orchestrator module - Dependency-ordered startup with readiness gating.
//!
//! The orchestrator walks a validated [`ServiceGraph`] layer by layer. Every
//! service of a layer is started and probed concurrently; the next layer is
//! only reached once every service of the current one is ready. The first
//! failure halts the run, and ready services with a registered cleanup
//! action are cleaned up in reverse start order.

mod lifecycle;
pub mod report;
pub mod state;

#[cfg(test)]
mod orchestrator_tests;

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{Result, ServiceError};
use crate::graph::ServiceGraph;
use crate::probe::ReadinessProber;
use crate::service::ServiceBackend;
use lifecycle::Lifecycle;

pub use report::{OrchestrationReport, ProbeRecord, RunResult};
pub use state::ServiceState;

/// Drives a service graph to readiness.
pub struct Orchestrator {
    backend: Arc<dyn ServiceBackend>,
    prober: Arc<dyn ReadinessProber>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with default backoff and failure policy.
    pub fn new(backend: Arc<dyn ServiceBackend>, prober: Arc<dyn ReadinessProber>) -> Self {
        Self::with_config(backend, prober, OrchestratorConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn ServiceBackend>,
        prober: Arc<dyn ReadinessProber>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            prober,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs the graph to completion.
    ///
    /// Returns `Err` only when the graph is invalid, in which case nothing
    /// was started. Service failures are reported in the returned report.
    pub async fn run(&self, graph: &ServiceGraph) -> Result<OrchestrationReport> {
        self.run_with_cancellation(graph, CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run`], stopping at the next retry boundary once
    /// `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        graph: &ServiceGraph,
        cancel: CancellationToken,
    ) -> Result<OrchestrationReport> {
        graph.validate()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("orchestration", run_id = %run_id);
        let report = self.execute(graph, cancel, run_id).instrument(span).await;
        Ok(report)
    }

    async fn execute(
        &self,
        graph: &ServiceGraph,
        cancel: CancellationToken,
        run_id: Uuid,
    ) -> OrchestrationReport {
        let started_at = Utc::now();
        info!(services = graph.len(), "Orchestration started");

        let mut results: BTreeMap<String, RunResult> = BTreeMap::new();
        let mut layers = Vec::new();
        let mut ready_order = Vec::new();
        let mut halted = false;
        let mut cancelled = false;

        for (index, layer) in graph.layers().enumerate() {
            if !halted && cancel.is_cancelled() {
                info!(layer = index, "Orchestration cancelled");
                halted = true;
                cancelled = true;
            }

            if halted {
                for name in &layer {
                    let reason = Self::not_started_reason(graph, &results, name);
                    results.insert(name.clone(), RunResult::pending(name.clone(), Some(reason)));
                }
                layers.push(layer);
                continue;
            }

            info!(layer = index, services = ?layer, "Starting layer");
            let layer_results = self.run_layer(graph, &layer, &results, &cancel).await;

            for result in layer_results {
                if result.is_ready() {
                    ready_order.push(result.service.clone());
                } else {
                    halted = true;
                    if matches!(result.last_error, Some(ServiceError::Cancelled { .. })) {
                        cancelled = true;
                    } else if result.is_failed() {
                        error!(
                            layer = index,
                            service = %result.service,
                            error = ?result.last_error,
                            "Service did not become ready; halting"
                        );
                    }
                }
                results.insert(result.service.clone(), result);
            }
            layers.push(layer);
        }

        if halted && !cancelled && self.config.cleanup_on_failure {
            self.cleanup(&ready_order, &mut results).await;
        }

        let overall_ok = results.values().all(RunResult::is_ready);
        info!(overall_ok = overall_ok, cancelled = cancelled, "Orchestration finished");

        OrchestrationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            layers,
            results,
            overall_ok,
            cancelled,
        }
    }

    /// Starts and probes one layer concurrently, waiting for every service.
    ///
    /// Results are returned sorted by service name.
    async fn run_layer(
        &self,
        graph: &ServiceGraph,
        layer: &[String],
        results: &BTreeMap<String, RunResult>,
        cancel: &CancellationToken,
    ) -> Vec<RunResult> {
        let mut tasks = JoinSet::new();
        let mut layer_results = Vec::with_capacity(layer.len());

        for name in layer {
            let Some(service) = graph.get(name) else {
                continue;
            };

            let blocking = service
                .dependencies()
                .iter()
                .find(|dep| !results.get(dep.as_str()).is_some_and(RunResult::is_ready));
            if let Some(dependency) = blocking {
                warn!(service = %name, dependency = %dependency, "Dependency not ready");
                layer_results.push(RunResult::pending(
                    name.clone(),
                    Some(ServiceError::DependencyNotReady {
                        service: name.clone(),
                        dependency: dependency.clone(),
                    }),
                ));
                continue;
            }

            let lifecycle = Lifecycle {
                backend: Arc::clone(&self.backend),
                prober: Arc::clone(&self.prober),
                config: self.config.clone(),
                cancel: cancel.clone(),
            };
            tasks.spawn(lifecycle.drive(service.clone()).in_current_span());
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => layer_results.push(result),
                Err(e) => error!(error = %e, "Service task aborted"),
            }
        }

        // A task that panicked leaves no result behind.
        for name in layer {
            if !layer_results.iter().any(|r| &r.service == name) {
                let mut lost = RunResult::pending(name.clone(), None);
                lost.state = ServiceState::Failed;
                lost.last_error = Some(ServiceError::Start {
                    service: name.clone(),
                    message: "service task aborted".to_string(),
                });
                layer_results.push(lost);
            }
        }

        layer_results.sort_by(|a, b| a.service.cmp(&b.service));
        layer_results
    }

    /// Why `name` was not started after the run halted.
    fn not_started_reason(
        graph: &ServiceGraph,
        results: &BTreeMap<String, RunResult>,
        name: &str,
    ) -> ServiceError {
        let blocking = graph.get(name).and_then(|service| {
            service
                .dependencies()
                .iter()
                .find(|dep| !results.get(dep.as_str()).is_some_and(RunResult::is_ready))
        });

        match blocking {
            Some(dependency) => ServiceError::DependencyNotReady {
                service: name.to_string(),
                dependency: dependency.clone(),
            },
            None => ServiceError::Halted {
                service: name.to_string(),
            },
        }
    }

    /// Best-effort cleanup of ready services, newest first.
    async fn cleanup(&self, ready_order: &[String], results: &mut BTreeMap<String, RunResult>) {
        for name in ready_order.iter().rev() {
            if !self.backend.has_cleanup(name) {
                continue;
            }

            info!(service = %name, "Cleaning up service");
            match self.backend.cleanup(name).await {
                Ok(()) => {
                    if let Some(result) = results.get_mut(name) {
                        result.cleaned_up = true;
                    }
                }
                Err(e) => warn!(service = %name, error = %e, "Cleanup failed"),
            }
        }
    }
}
