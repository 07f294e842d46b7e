use labperiph_orchestrator::config::OrchestratorConfig;
use labperiph_orchestrator::features::containers::service::ContainerExecutor;
use labperiph_orchestrator::features::libs::repo::GrpcLibsBackend;
use labperiph_orchestrator::features::libs::service::LibsExecutor;
use labperiph_orchestrator::features::logs::service::LogFanout;
use labperiph_orchestrator::{AsyncOrchestrator, Command, CommandExecutor, OrchestratorError};
use labperiph_runtime::DockerCli;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("labperiph_orchestrator=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: labperiph-orchestrator <commands.json>")?;
    let raw = tokio::fs::read_to_string(&path).await?;
    let commands: Vec<Command> = serde_json::from_str(&raw)?;

    let config = OrchestratorConfig::from_env();
    info!(
        commands = commands.len(),
        log_dir = %config.log_dir.display(),
        "Starting orchestrator"
    );

    let runtime = Arc::new(DockerCli::new(config.docker.clone()));
    let logs = Arc::new(LogFanout::new(config.log_dir.clone()));
    let containers = Arc::new(ContainerExecutor::new(runtime, logs.clone()));

    let container_executor: Arc<dyn CommandExecutor> = containers.clone();
    let mut executors = vec![container_executor];
    if let Some(addr) = &config.libs_addr {
        match GrpcLibsBackend::connect(addr).await {
            Ok(backend) => executors.push(Arc::new(LibsExecutor::new(Arc::new(backend)))),
            Err(error) => warn!(addr = %addr, error = %error, "Library hosting service unavailable"),
        }
    }
    let orchestrator = AsyncOrchestrator::new(executors);

    let mut failed = false;
    for command in &commands {
        let step = CancellationToken::new();
        match orchestrator.dispatch(command, &step).await {
            Ok(output) => println!("{}", serde_json::to_string(&output)?),
            Err(error) => {
                error!(command = command.kind(), error = %error, "Command failed, stopping");
                failed = true;
                break;
            }
        }
    }

    match logs.close().await {
        Ok(()) | Err(OrchestratorError::LogsClosed) => {}
        Err(error) => warn!(error = %error, "Failed to close log streams"),
    }
    containers.shutdown_services().await;

    if failed {
        return Err("command list did not complete".into());
    }
    info!("All commands completed");
    Ok(())
}
