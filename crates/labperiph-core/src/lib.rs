pub mod health;
pub mod registration;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use health::{HealthPolicy, HealthTracker};
pub use registration::LibraryRegistration;

/// Exit code reported for a process that did not finish before its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unregistered library: {0}")]
    UnregisteredLibrary(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Infrastructure error: {0}")]
    TransientInfra(String),
    #[error("{operation} exceeded timeout of {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
        result: ExecutionResult,
    },
    #[error("Not running: {0}")]
    NotRunning(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout { .. })
    }

    /// Execution result attached to the error, if the failure came from a
    /// process that was actually spawned.
    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        match self {
            CoreError::Timeout { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Prefix the error message with operation context, keeping the variant.
    pub fn context(self, ctx: impl fmt::Display) -> Self {
        match self {
            CoreError::Validation(msg) => CoreError::Validation(format!("{ctx}: {msg}")),
            CoreError::UnregisteredLibrary(msg) => {
                CoreError::UnregisteredLibrary(format!("{ctx}: {msg}"))
            }
            CoreError::Conflict(msg) => CoreError::Conflict(format!("{ctx}: {msg}")),
            CoreError::TransientInfra(msg) => CoreError::TransientInfra(format!("{ctx}: {msg}")),
            CoreError::Timeout {
                operation,
                timeout,
                result,
            } => CoreError::Timeout {
                operation: format!("{ctx}: {operation}"),
                timeout,
                result,
            },
            CoreError::NotRunning(msg) => CoreError::NotRunning(format!("{ctx}: {msg}")),
            CoreError::Io(msg) => CoreError::Io(format!("{ctx}: {msg}")),
            CoreError::SerializationError(msg) => {
                CoreError::SerializationError(format!("{ctx}: {msg}"))
            }
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Outcome of one timed external process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub finished_on_time: bool,
}

impl ExecutionResult {
    pub fn completed(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            finished_on_time: true,
        }
    }

    pub fn timed_out(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout,
            stderr,
            finished_on_time: false,
        }
    }

    pub fn success(&self) -> bool {
        self.finished_on_time && self.exit_code == 0
    }

    /// Turn a completed-but-failed run into a `TransientInfra` error that
    /// names the operation and exit code.
    pub fn into_checked(self, operation: impl fmt::Display) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(CoreError::TransientInfra(format!(
            "{operation} failed with exit code {}: {}",
            self.exit_code,
            self.stderr.trim()
        )))
    }
}

/// Host and port of a remote daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DaemonEndpoint {
    pub host: String,
    pub port: i32,
}

impl DaemonEndpoint {
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    Unknown,
    Running,
    Stopping,
    NotRunning,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonStatus::Unknown => "unknown",
            DaemonStatus::Running => "running",
            DaemonStatus::Stopping => "stopping",
            DaemonStatus::NotRunning => "not_running",
        };
        f.write_str(name)
    }
}

/// Start parameters for servod. Zero values mean "not requested".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServodOptions {
    pub servod_port: i32,
    pub dut_board: String,
    pub dut_model: String,
    pub servo_serial: String,
    pub servo_dual: bool,
    pub use_cr50_config: bool,
    pub recovery_mode: bool,
}

/// Servod location a library container needs to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoAddress {
    pub host: String,
    pub port: i32,
}

/// Desired configuration for one `docker run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub registry: String,
    pub exec_command: Vec<String>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    /// `src:dst` bind mounts.
    pub volumes: Vec<String>,
    /// `host:container` published ports.
    pub port_mappings: Vec<String>,
    /// Container ports published to ephemeral host ports.
    pub expose_ports: Vec<u16>,
    pub detach: bool,
    pub privileged: bool,
    pub network: Option<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Fully qualified image reference, `registry/image` when a registry is set.
    pub fn image_ref(&self) -> String {
        let registry = self.registry.trim_end_matches('/');
        if registry.is_empty() {
            self.image.clone()
        } else {
            format!("{}/{}", registry, self.image)
        }
    }
}

/// Routable handle for a hosted library instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibHandle {
    pub id: String,
    pub port: i32,
}
