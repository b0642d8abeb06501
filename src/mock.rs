//! # In-memory collaborators
//!
//! [`MockBackend`], [`MockProber`] and [`MockRunner`] implement the same
//! traits as the process-backed collaborators but never touch the network or
//! spawn a process. They let orchestration logic be tested deterministically,
//! usually together with `#[tokio::test(start_paused = true)]` so that retry
//! intervals elapse instantly.
//!
//! Backend and prober can share a [`Journal`] to assert on the relative order
//! of starts and probes:
//!
//! ```text
//! let journal = Journal::new();
//! let backend = MockBackend::new().with_journal(journal.clone());
//! let prober = MockProber::new()
//!     .with_journal(journal.clone())
//!     .script(ReadinessCheck::tcp("localhost", 5432), ProbeScript::ReadyOnAttempt(3));
//! ```

use crate::error::{JunbanError, Result};
use crate::probe::{ProbeOutcome, ReadinessCheck, ReadinessProber};
use crate::service::{CommandOutput, CommandRunner, CommandSpec, ServiceBackend};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Journal
// ============================================================================

/// Something a mock collaborator was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start { service: String, at: Instant },
    Cleanup { service: String, at: Instant },
    Probe(ProbeCall),
}

/// One probe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCall {
    pub check: ReadinessCheck,
    /// Attempt number passed by the caller.
    pub attempt: u32,
    pub ready: bool,
    pub at: Instant,
}

/// Ordered, shareable record of mock events.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        lock(&self.events).push(event);
    }

    /// Snapshot of all events in the order they happened.
    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    /// Position of the first start of `service`.
    pub fn start_index(&self, service: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| matches!(e, Event::Start { service: s, .. } if s == service))
    }

    /// Position of the first ready probe of `check`.
    pub fn ready_index(&self, check: &ReadinessCheck) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| matches!(e, Event::Probe(call) if call.ready && &call.check == check))
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Start backend that records calls and fails on demand.
#[derive(Debug, Default)]
pub struct MockBackend {
    start_failures: HashMap<String, String>,
    cleanup_failures: HashMap<String, String>,
    cleanups: HashSet<String>,
    journal: Journal,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `start(service)` return a backend error.
    pub fn fail_start(mut self, service: impl Into<String>, message: impl Into<String>) -> Self {
        self.start_failures.insert(service.into(), message.into());
        self
    }

    /// Registers a cleanup action for `service`.
    pub fn with_cleanup(mut self, service: impl Into<String>) -> Self {
        self.cleanups.insert(service.into());
        self
    }

    /// Registers a cleanup action for `service` that fails.
    pub fn fail_cleanup(mut self, service: impl Into<String>, message: impl Into<String>) -> Self {
        let service = service.into();
        self.cleanups.insert(service.clone());
        self.cleanup_failures.insert(service, message.into());
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Services whose start was invoked, in call order.
    pub fn started(&self) -> Vec<String> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start { service, .. } => Some(service),
                _ => None,
            })
            .collect()
    }

    /// Services whose cleanup was invoked, in call order.
    pub fn cleaned_up(&self) -> Vec<String> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Cleanup { service, .. } => Some(service),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ServiceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn has_cleanup(&self, service: &str) -> bool {
        self.cleanups.contains(service)
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.journal.record(Event::Start {
            service: service.to_string(),
            at: Instant::now(),
        });
        match self.start_failures.get(service) {
            Some(message) => Err(JunbanError::backend(message.clone())),
            None => Ok(()),
        }
    }

    async fn cleanup(&self, service: &str) -> Result<()> {
        self.journal.record(Event::Cleanup {
            service: service.to_string(),
            at: Instant::now(),
        });
        match self.cleanup_failures.get(service) {
            Some(message) => Err(JunbanError::backend(message.clone())),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Prober
// ============================================================================

/// Scripted answers for one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeScript {
    Ready,
    NeverReady,
    /// Not ready until the n-th probe of this check (1-based).
    ReadyOnAttempt(u32),
    /// Every probe errors as a malformed check.
    Invalid(String),
}

/// Prober answering from scripts. Unscripted checks are ready.
#[derive(Debug, Default)]
pub struct MockProber {
    scripts: HashMap<ReadinessCheck, ProbeScript>,
    counts: Mutex<HashMap<ReadinessCheck, u32>>,
    latency: Duration,
    journal: Journal,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, check: ReadinessCheck, script: ProbeScript) -> Self {
        self.scripts.insert(check, script);
        self
    }

    /// Delays every answer, as a slow network would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// All probe calls in order.
    pub fn calls(&self) -> Vec<ProbeCall> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Probe(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Probe calls for one check.
    pub fn calls_for(&self, check: &ReadinessCheck) -> Vec<ProbeCall> {
        self.calls()
            .into_iter()
            .filter(|call| &call.check == check)
            .collect()
    }
}

#[async_trait]
impl ReadinessProber for MockProber {
    async fn probe(&self, check: &ReadinessCheck, attempt: u32) -> Result<ProbeOutcome> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let count = {
            let mut counts = lock(&self.counts);
            let count = counts.entry(check.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let outcome = match self.scripts.get(check) {
            None | Some(ProbeScript::Ready) => ProbeOutcome::Ready,
            Some(ProbeScript::NeverReady) => ProbeOutcome::not_ready(format!("{} refused", check)),
            Some(ProbeScript::ReadyOnAttempt(n)) if count >= *n => ProbeOutcome::Ready,
            Some(ProbeScript::ReadyOnAttempt(_)) => {
                ProbeOutcome::not_ready(format!("{} not ready (probe {})", check, count))
            }
            Some(ProbeScript::Invalid(message)) => {
                return Err(JunbanError::invalid_probe(message.clone()))
            }
        };

        self.journal.record(Event::Probe(ProbeCall {
            check: check.clone(),
            attempt,
            ready: outcome.is_ready(),
            at: Instant::now(),
        }));

        Ok(outcome)
    }
}

// ============================================================================
// Command runner
// ============================================================================

/// Command runner that records specs instead of spawning processes.
///
/// Commands succeed with empty output unless their program was registered
/// with [`MockRunner::fail`].
#[derive(Debug, Default)]
pub struct MockRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Mutex<HashMap<String, (i32, String)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every invocation of `program` exit with `code`.
    pub fn fail(&self, program: impl Into<String>, code: i32, output: impl Into<String>) {
        lock(&self.failures).insert(program.into(), (code, output.into()));
    }

    /// Specs passed to `run`, in call order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        lock(&self.calls).push(spec.clone());

        let output = match lock(&self.failures).get(&spec.program) {
            Some((code, output)) => CommandOutput {
                success: false,
                exit_code: Some(*code),
                output: output.clone(),
            },
            None => CommandOutput {
                success: true,
                exit_code: Some(0),
                output: String::new(),
            },
        };
        Ok(output)
    }
}
