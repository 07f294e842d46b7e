use crate::command::{Command, CommandOutput};
use crate::error::{OrchestratorError, Result};
use crate::features::libs::repo::LibsBackend;
use crate::CommandExecutor;
use async_trait::async_trait;
use labperiph_proto::KillLibRequest;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs get-lib and kill-lib against the library hosting service.
pub struct LibsExecutor {
    backend: Arc<dyn LibsBackend>,
}

impl LibsExecutor {
    pub fn new(backend: Arc<dyn LibsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CommandExecutor for LibsExecutor {
    fn name(&self) -> &'static str {
        "libs"
    }

    async fn execute(&self, command: &Command, step: &CancellationToken) -> Result<CommandOutput> {
        let work = async {
            match command {
                Command::GetLib(request) => {
                    let response = self.backend.get_lib(request.clone()).await?;
                    info!(lib = %request.name, success = response.is_success(), "Get lib finished");
                    Ok(CommandOutput::Lib { response })
                }
                Command::KillLib { id } => {
                    self.backend
                        .kill_lib(KillLibRequest { id: id.clone() })
                        .await?;
                    Ok(CommandOutput::LibKilled { id: id.clone() })
                }
                other => Err(OrchestratorError::Unsupported(other.kind().to_string())),
            }
        };

        tokio::select! {
            _ = step.cancelled() => Err(OrchestratorError::Cancelled(command.kind().to_string())),
            result = work => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labperiph_proto::{FailureReason, GetLibRequest, GetLibResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        killed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LibsBackend for FakeBackend {
        async fn get_lib(&self, request: GetLibRequest) -> Result<GetLibResponse> {
            if request.name == "foo" {
                Ok(GetLibResponse::Success {
                    id: "foo.0".to_string(),
                    port: 49153,
                })
            } else {
                Ok(GetLibResponse::Failure {
                    reason: FailureReason::UnregisteredLib,
                    message: format!("{} is not registered", request.name),
                })
            }
        }

        async fn kill_lib(&self, request: KillLibRequest) -> Result<()> {
            self.killed.lock().unwrap().push(request.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_get_lib_passes_response_through() {
        let executor = LibsExecutor::new(Arc::new(FakeBackend::default()));
        let step = CancellationToken::new();

        let output = executor
            .execute(&Command::GetLib(GetLibRequest::new("foo")), &step)
            .await
            .unwrap();
        assert_eq!(
            output,
            CommandOutput::Lib {
                response: GetLibResponse::Success {
                    id: "foo.0".to_string(),
                    port: 49153,
                }
            }
        );

        let output = executor
            .execute(&Command::GetLib(GetLibRequest::new("bar")), &step)
            .await
            .unwrap();
        assert!(matches!(
            output,
            CommandOutput::Lib {
                response: GetLibResponse::Failure {
                    reason: FailureReason::UnregisteredLib,
                    ..
                }
            }
        ));
    }

    #[tokio::test]
    async fn test_kill_lib() {
        let backend = Arc::new(FakeBackend::default());
        let executor = LibsExecutor::new(backend.clone());
        executor
            .execute(
                &Command::KillLib {
                    id: "foo.0".to_string(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(*backend.killed.lock().unwrap(), vec!["foo.0"]);
    }

    #[tokio::test]
    async fn test_container_commands_are_unsupported() {
        let executor = LibsExecutor::new(Arc::new(FakeBackend::default()));
        let err = executor
            .execute(&Command::CloseLogs, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
    }
}
