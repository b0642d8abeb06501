//! Prober backed by real network and process primitives.

use crate::config::TimeoutConfig;
use crate::error::{JunbanError, Result};
use crate::probe::{ProbeOutcome, ReadinessCheck, ReadinessProber};
use crate::service::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Per-attempt timeouts for each probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub tcp: Duration,
    pub http: Duration,
    pub command: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for ProbeTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            tcp: Duration::from_millis(config.tcp_ms),
            http: Duration::from_millis(config.http_ms),
            command: Duration::from_secs(config.command_seconds),
        }
    }
}

/// Probes with TCP dials, HTTP GETs and child processes.
pub struct SystemProber {
    timeouts: ProbeTimeouts,
    runner: Arc<dyn CommandRunner>,
    client: Client,
}

impl SystemProber {
    /// Creates a prober.
    ///
    /// Redirects are not followed so that a 3xx answer counts as ready.
    pub fn new(timeouts: ProbeTimeouts, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                JunbanError::backend_with_source("Failed to create HTTP client".to_string(), e)
            })?;

        Ok(Self {
            timeouts,
            runner,
            client,
        })
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        self.timeouts
    }

    async fn probe_tcp(&self, host: &str, port: u16) -> ProbeOutcome {
        match timeout(self.timeouts.tcp, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                ProbeOutcome::Ready
            }
            Ok(Err(e)) => {
                ProbeOutcome::not_ready(format!("connect to {}:{} failed: {}", host, port, e))
            }
            Err(_) => ProbeOutcome::not_ready(format!(
                "connect to {}:{} timed out after {}ms",
                host,
                port,
                self.timeouts.tcp.as_millis()
            )),
        }
    }

    async fn probe_http(&self, url: &str) -> Result<ProbeOutcome> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| JunbanError::invalid_probe(format!("invalid url '{}': {}", url, e)))?;

        let outcome = match self
            .client
            .get(parsed)
            .timeout(self.timeouts.http)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if (200..=399).contains(&status.as_u16()) {
                    ProbeOutcome::Ready
                } else {
                    ProbeOutcome::not_ready(format!("GET {} returned {}", url, status))
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::not_ready(format!(
                "GET {} timed out after {}ms",
                url,
                self.timeouts.http.as_millis()
            )),
            Err(e) => ProbeOutcome::not_ready(format!("GET {} failed: {}", url, e)),
        };
        Ok(outcome)
    }

    async fn probe_command(&self, command: &str) -> Result<ProbeOutcome> {
        let spec = CommandSpec::parse(command)
            .map_err(|e| JunbanError::invalid_probe(e.to_string()))?
            .timeout(self.timeouts.command);

        let outcome = match self.runner.run(&spec).await {
            Ok(output) if output.success => ProbeOutcome::Ready,
            Ok(output) => ProbeOutcome::not_ready(format!(
                "`{}` {}",
                spec.display(),
                output.failure_reason()
            )),
            Err(e) => ProbeOutcome::not_ready(e.to_string()),
        };
        Ok(outcome)
    }
}

#[async_trait]
impl ReadinessProber for SystemProber {
    async fn probe(&self, check: &ReadinessCheck, attempt: u32) -> Result<ProbeOutcome> {
        check.validate()?;

        let outcome = match check {
            ReadinessCheck::Tcp { host, port } => self.probe_tcp(host, *port).await,
            ReadinessCheck::Http { url } => self.probe_http(url).await?,
            ReadinessCheck::Command { command } => self.probe_command(command).await?,
        };

        trace!(
            check = %check,
            attempt = attempt,
            ready = outcome.is_ready(),
            reason = outcome.reason().unwrap_or_default(),
            "Probe completed"
        );

        Ok(outcome)
    }
}
