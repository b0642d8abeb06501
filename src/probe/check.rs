//! Readiness check descriptors.
//!
//! A [`ReadinessCheck`] only describes what to look at; running it is the job
//! of a [`ReadinessProber`](super::ReadinessProber).

use crate::error::{JunbanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to decide that a started service accepts work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReadinessCheck {
    /// Ready once a TCP connection to `host:port` succeeds.
    #[serde(alias = "tcp-connect")]
    Tcp { host: String, port: u16 },

    /// Ready once `GET url` answers with a status in 200..=399.
    #[serde(alias = "http-200")]
    Http { url: String },

    /// Ready once `command` exits with status 0.
    #[serde(alias = "command-exit-zero")]
    Command { command: String },
}

impl ReadinessCheck {
    /// Creates a TCP-connect check.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        ReadinessCheck::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Creates an HTTP check.
    pub fn http(url: impl Into<String>) -> Self {
        ReadinessCheck::Http { url: url.into() }
    }

    /// Creates a command-exit-zero check.
    pub fn command(command: impl Into<String>) -> Self {
        ReadinessCheck::Command {
            command: command.into(),
        }
    }

    /// Short name of the check kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadinessCheck::Tcp { .. } => "tcp",
            ReadinessCheck::Http { .. } => "http",
            ReadinessCheck::Command { .. } => "command",
        }
    }

    /// Checks that the descriptor can be executed at all.
    ///
    /// Only malformed configuration fails here; whether the target is
    /// reachable is a probe-time question.
    pub fn validate(&self) -> Result<()> {
        match self {
            ReadinessCheck::Tcp { host, port } => {
                if host.trim().is_empty() {
                    return Err(JunbanError::invalid_probe("tcp check requires a host"));
                }
                if *port == 0 {
                    return Err(JunbanError::invalid_probe("tcp check port must be > 0"));
                }
            }
            ReadinessCheck::Http { url } => {
                let parsed = reqwest::Url::parse(url).map_err(|e| {
                    JunbanError::invalid_probe(format!("invalid url '{}': {}", url, e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(JunbanError::invalid_probe(format!(
                        "unsupported url scheme '{}' in '{}'",
                        parsed.scheme(),
                        url
                    )));
                }
            }
            ReadinessCheck::Command { command } => {
                let parts = shell_words::split(command).map_err(|e| {
                    JunbanError::invalid_probe(format!(
                        "failed to parse command '{}': {}",
                        command, e
                    ))
                })?;
                if parts.is_empty() {
                    return Err(JunbanError::invalid_probe("command check is empty"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessCheck::Tcp { host, port } => write!(f, "tcp {}:{}", host, port),
            ReadinessCheck::Http { url } => write!(f, "GET {}", url),
            ReadinessCheck::Command { command } => write!(f, "`{}`", command),
        }
    }
}
