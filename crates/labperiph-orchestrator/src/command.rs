//! Typed commands accepted by the orchestrator and their outputs.

use labperiph_core::ContainerSpec;
use labperiph_proto::{GetLibRequest, GetLibResponse};
use serde::{Deserialize, Serialize};

fn default_run_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Command {
    /// Pull and run a container; detached containers get their logs streamed.
    StartContainer {
        spec: ContainerSpec,
        #[serde(default = "default_run_timeout_secs")]
        timeout_secs: u64,
    },
    StopContainer {
        name: String,
    },
    /// Lines recorded so far for a container or detached service.
    ReadLogs {
        name: String,
    },
    CloseLogs,
    /// Launch a long-lived local process that outlives the current step.
    StartAsyncService {
        name: String,
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Auth {
        registry: String,
        user: String,
        token: String,
    },
    GetLib(GetLibRequest),
    KillLib {
        id: String,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::StartContainer { .. } => "start-container",
            Command::StopContainer { .. } => "stop-container",
            Command::ReadLogs { .. } => "read-logs",
            Command::CloseLogs => "close-logs",
            Command::StartAsyncService { .. } => "start-async-service",
            Command::Auth { .. } => "auth",
            Command::GetLib(_) => "get-lib",
            Command::KillLib { .. } => "kill-lib",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CommandOutput {
    ContainerStarted { name: String, container_id: String },
    ContainerStopped { name: String },
    Logs { name: String, lines: Vec<String> },
    LogsClosed,
    ServiceStarted { name: String, pid: Option<u32> },
    Authenticated { registry: String },
    Lib { response: GetLibResponse },
    LibKilled { id: String },
}
