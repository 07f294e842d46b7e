use labperiph_libs::build_hosting;
use labperiph_libs::config::LibsConfig;
use labperiph_libs::server::LibsServer;
use labperiph_proto::v1::libs_service_server::LibsServiceServer;
use labperiph_runtime::DockerCli;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("labperiph_libs=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = LibsConfig::from_env()?;

    info!(
        addr = %config.addr,
        prefix = %config.hosting.container_prefix,
        "Starting library hosting service"
    );

    let runtime = Arc::new(DockerCli::new(config.docker.clone()));
    let (registry, controller) = build_hosting(runtime, config.hosting.clone());

    match registry.load(&config.manifest).await {
        Ok(count) => info!(manifest = %config.manifest.display(), count, "Library manifest loaded"),
        Err(error) => {
            warn!(manifest = %config.manifest.display(), error = %error, "Failed to load library manifest")
        }
    }

    let server = LibsServer::new(controller);

    info!(addr = %config.addr, "Library hosting service initialized successfully");

    Server::builder()
        .add_service(LibsServiceServer::new(server))
        .serve(config.addr)
        .await?;

    Ok(())
}
