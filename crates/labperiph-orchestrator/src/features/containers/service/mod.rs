use crate::command::{Command, CommandOutput};
use crate::error::{OrchestratorError, Result};
use crate::features::detached::service::DetachedHandle;
use crate::features::logs::service::LogFanout;
use crate::CommandExecutor;
use async_trait::async_trait;
use labperiph_core::ContainerSpec;
use labperiph_runtime::ContainerRuntime;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs container, log and detached-service commands.
pub struct ContainerExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    logs: Arc<LogFanout>,
    services: Mutex<HashMap<String, DetachedHandle>>,
}

impl ContainerExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, logs: Arc<LogFanout>) -> Self {
        Self {
            runtime,
            logs,
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Stop every detached service started through this executor.
    pub async fn shutdown_services(&self) {
        let services = std::mem::take(&mut *self.services.lock().await);
        for (name, handle) in services {
            info!(service = %name, "Shutting down detached service");
            handle.shutdown().await;
        }
    }

    async fn start_container(
        &self,
        spec: &ContainerSpec,
        timeout: Duration,
        step: &CancellationToken,
    ) -> Result<CommandOutput> {
        if spec.name.is_empty() || spec.image.is_empty() {
            return Err(OrchestratorError::InvalidCommand(
                "start-container needs a name and an image".to_string(),
            ));
        }

        until_cancelled(step, "pull image", self.runtime.pull_image(spec)).await?;
        let result = until_cancelled(step, "run container", self.runtime.run(spec, timeout)).await?;

        if spec.detach {
            let follower = self.runtime.follow_logs(&spec.name).await?;
            self.logs.push(&spec.name, follower).await?;
        }

        info!(container = %spec.name, image = %spec.image_ref(), "Container started");
        Ok(CommandOutput::ContainerStarted {
            name: spec.name.clone(),
            container_id: result.stdout.trim().to_string(),
        })
    }

    async fn start_service(&self, name: &str, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut services = self.services.lock().await;
        if let Some(existing) = services.get(name) {
            if existing.is_running().await {
                return Err(OrchestratorError::InvalidCommand(format!(
                    "service {name} is already running"
                )));
            }
        }

        // The handle owns its own token: cancelling the step leaves it running.
        let log_file = self.logs.log_path(name)?;
        let handle = DetachedHandle::spawn(name, program, args, &log_file).await?;
        let pid = handle.pid();
        if let Some(previous) = services.insert(name.to_string(), handle) {
            previous.shutdown().await;
        }

        Ok(CommandOutput::ServiceStarted {
            name: name.to_string(),
            pid,
        })
    }
}

async fn until_cancelled<T, F>(step: &CancellationToken, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = labperiph_core::Result<T>>,
{
    tokio::select! {
        _ = step.cancelled() => Err(OrchestratorError::Cancelled(what.to_string())),
        result = fut => Ok(result?),
    }
}

#[async_trait]
impl CommandExecutor for ContainerExecutor {
    fn name(&self) -> &'static str {
        "containers"
    }

    async fn execute(&self, command: &Command, step: &CancellationToken) -> Result<CommandOutput> {
        match command {
            Command::StartContainer { spec, timeout_secs } => {
                self.start_container(spec, Duration::from_secs(*timeout_secs), step)
                    .await
            }
            Command::StopContainer { name } => {
                self.runtime.remove(name, true).await?;
                info!(container = %name, "Container stopped");
                Ok(CommandOutput::ContainerStopped { name: name.clone() })
            }
            Command::ReadLogs { name } => Ok(CommandOutput::Logs {
                name: name.clone(),
                lines: self.logs.read(name).await?,
            }),
            Command::CloseLogs => {
                self.logs.close().await?;
                Ok(CommandOutput::LogsClosed)
            }
            Command::StartAsyncService {
                name,
                program,
                args,
            } => self.start_service(name, program, args).await,
            Command::Auth {
                registry,
                user,
                token,
            } => {
                self.runtime.login(registry, user, token).await?;
                Ok(CommandOutput::Authenticated {
                    registry: registry.clone(),
                })
            }
            other => Err(OrchestratorError::Unsupported(other.kind().to_string())),
        }
    }
}
