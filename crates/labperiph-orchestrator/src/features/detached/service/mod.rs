use crate::error::Result;
use labperiph_core::CoreError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A background process whose lifetime is decoupled from the step that
/// started it. Only `shutdown` (or dropping the handle) stops it.
pub struct DetachedHandle {
    name: String,
    pid: Option<u32>,
    token: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl DetachedHandle {
    /// Spawn `program` with its combined output appended to `log_file`.
    pub async fn spawn(name: &str, program: &str, args: &[String], log_file: &Path) -> Result<Self> {
        if let Some(parent) = log_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .await?;
        let stderr = log.try_clone().await?.into_std().await;
        let stdout = log.into_std().await;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CoreError::TransientInfra(format!("failed to start service {name} ({program}): {e}"))
            })?;

        let pid = child.id();
        let token = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(name.to_string(), child, token.clone()));

        info!(service = %name, program = %program, pid = ?pid, "Started detached service");
        Ok(Self {
            name: name.to_string(),
            pid,
            token,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .await
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Kill the process and wait for it to be reaped. Safe to call again.
    pub async fn shutdown(&self) {
        self.token.cancel();
        if let Some(task) = self.supervisor.lock().await.take() {
            if let Err(error) = task.await {
                warn!(service = %self.name, error = %error, "Service supervisor failed");
            }
        }
    }
}

impl Drop for DetachedHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn supervise(name: String, mut child: Child, token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {
            if let Err(error) = child.kill().await {
                warn!(service = %name, error = %error, "Failed to kill service");
            }
            info!(service = %name, "Detached service stopped");
        }
        status = child.wait() => match status {
            Ok(status) => info!(service = %name, exit_code = ?status.code(), "Detached service exited"),
            Err(error) => warn!(service = %name, error = %error, "Detached service wait failed"),
        },
    }
}
