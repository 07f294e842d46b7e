pub mod command;
pub mod config;
pub mod error;
pub mod features;

pub use command::{Command, CommandOutput};
pub use error::{OrchestratorError, Result};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handler for a family of commands.
///
/// Executors answer `OrchestratorError::Unsupported` for commands outside
/// their family so a dispatcher can route by trying each in turn.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run `command` as part of the logical step `step`. Work bound to the
    /// step stops when it is cancelled; detached services do not.
    async fn execute(&self, command: &Command, step: &CancellationToken) -> Result<CommandOutput>;
}

/// Routes commands to the first executor that owns them.
pub struct AsyncOrchestrator {
    executors: Vec<Arc<dyn CommandExecutor>>,
}

impl AsyncOrchestrator {
    pub fn new(executors: Vec<Arc<dyn CommandExecutor>>) -> Self {
        Self { executors }
    }

    pub async fn dispatch(
        &self,
        command: &Command,
        step: &CancellationToken,
    ) -> Result<CommandOutput> {
        info!(command = command.kind(), "Dispatching command");

        for executor in &self.executors {
            match executor.execute(command, step).await {
                Err(error) if error.is_unsupported() => {
                    debug!(command = command.kind(), executor = executor.name(), "Executor skipped command");
                }
                Err(error) => {
                    warn!(command = command.kind(), executor = executor.name(), error = %error, "Command failed");
                    return Err(error);
                }
                Ok(output) => return Ok(output),
            }
        }

        Err(OrchestratorError::Unsupported(command.kind().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OnlyCloseLogs {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandExecutor for OnlyCloseLogs {
        fn name(&self) -> &'static str {
            "close-only"
        }

        async fn execute(&self, command: &Command, _step: &CancellationToken) -> Result<CommandOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match command {
                Command::CloseLogs => Ok(CommandOutput::LogsClosed),
                other => Err(OrchestratorError::Unsupported(other.kind().to_string())),
            }
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl CommandExecutor for AlwaysFails {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn execute(&self, _command: &Command, _step: &CancellationToken) -> Result<CommandOutput> {
            Err(OrchestratorError::InvalidCommand("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_owner() {
        let first = Arc::new(OnlyCloseLogs {
            calls: AtomicUsize::new(0),
        });
        let executors: Vec<Arc<dyn CommandExecutor>> = vec![first.clone(), Arc::new(AlwaysFails)];
        let orchestrator = AsyncOrchestrator::new(executors);

        let output = orchestrator
            .dispatch(&Command::CloseLogs, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, CommandOutput::LogsClosed);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_stops_on_real_error() {
        let executors: Vec<Arc<dyn CommandExecutor>> = vec![
            Arc::new(OnlyCloseLogs {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(AlwaysFails),
        ];
        let orchestrator = AsyncOrchestrator::new(executors);
        let err = orchestrator
            .dispatch(
                &Command::StopContainer {
                    name: "c1".to_string(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn test_unowned_command_is_unsupported() {
        let only: Arc<dyn CommandExecutor> = Arc::new(OnlyCloseLogs {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = AsyncOrchestrator::new(vec![only]);
        let err = orchestrator
            .dispatch(
                &Command::KillLib {
                    id: "foo.0".to_string(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("kill-lib"));
    }
}
