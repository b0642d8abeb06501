//! Start backend configuration types.

use serde::{Deserialize, Serialize};

/// Backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Which backend starts services.
    pub kind: Backend,

    /// Settings for the compose backend.
    pub compose: ComposeConfig,
}

/// Service start backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Per-service start/cleanup command lines.
    #[default]
    Exec,

    /// A container runtime's compose subcommand.
    Compose,
}

/// Compose backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Container runtime binary (`docker`, `podman`).
    pub program: String,

    /// Compose file passed with `-f`.
    pub file: Option<String>,

    /// Project name passed with `-p`.
    pub project: Option<String>,

    /// Directory the runtime is invoked from.
    pub project_dir: Option<String>,

    /// Stop containers of ready services when a run halts.
    pub stop_on_cleanup: bool,

    /// Timeout for a single runtime invocation in seconds.
    pub timeout_seconds: u64,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            file: None,
            project: None,
            project_dir: None,
            stop_on_cleanup: true,
            timeout_seconds: 300,
        }
    }
}
