//! junban - Dependency-ordered service startup with readiness gating
//!
//! This crate starts the services of a deployment in dependency order and
//! gates every dependent on its dependencies passing a readiness check.
//!
//! # Overview
//!
//! A deployment is described as a [`ServiceGraph`]. The [`Orchestrator`]
//! walks it layer by layer: services of one layer are started concurrently
//! through a [`ServiceBackend`], probed with bounded retries through a
//! [`ReadinessProber`], and the next layer is only reached once all of them
//! are ready. A failure halts the run and the [`OrchestrationReport`] names
//! every service's final state.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Configuration file parsing and validation
//! - [`error`] - Error types and error handling
//! - [`graph`] - Service graph validation and layering
//! - [`mock`] - In-memory collaborators for tests
//! - [`orchestrator`] - Layered startup and reporting
//! - [`probe`] - Readiness checks and probers
//! - [`service`] - Start backends and process execution

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod mock;
pub mod orchestrator;
pub mod probe;
pub mod service;

// Re-exports for convenience
pub use cli::Cli;
pub use config::Config;
pub use error::{ErrorCode, GraphError, JunbanError, Result, ServiceError};
pub use graph::{Service, ServiceGraph};
pub use orchestrator::{OrchestrationReport, Orchestrator, RunResult, ServiceState};
pub use probe::{ReadinessCheck, ReadinessProber};
pub use service::ServiceBackend;
