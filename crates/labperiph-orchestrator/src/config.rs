use labperiph_runtime::DockerConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory container and service logs are written to.
    pub log_dir: PathBuf,
    /// Library hosting service address; library commands are unavailable without it.
    pub libs_addr: Option<String>,
    pub docker: DockerConfig,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            log_dir: std::env::var("ORCHESTRATOR_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/labperiph/logs")),
            libs_addr: std::env::var("LIBS_ADDR").ok().filter(|addr| !addr.is_empty()),
            docker: DockerConfig::from_env(),
        }
    }
}
