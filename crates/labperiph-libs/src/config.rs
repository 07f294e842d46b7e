use crate::features::library_hosting::service::HostingOptions;
use labperiph_runtime::DockerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LibsConfig {
    pub addr: SocketAddr,
    pub manifest: PathBuf,
    pub hosting: HostingOptions,
    pub docker: DockerConfig,
}

impl LibsConfig {
    pub fn from_env() -> Result<Self, String> {
        let addr = std::env::var("LIBS_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:50061".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid LIBS_ADDR: {e}"))?;

        let manifest = std::env::var("LIBS_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("libs.json"));

        let mut hosting = HostingOptions {
            container_prefix: std::env::var("LIBS_CONTAINER_PREFIX")
                .ok()
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or_else(random_prefix),
            ..Default::default()
        };
        if let Ok(dir) = std::env::var("LIBS_OUTPUT_DIR") {
            hosting.output_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("LIBS_CONNECTION_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|e| format!("invalid LIBS_CONNECTION_TIMEOUT_SECS: {e}"))?;
            hosting.connection_timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            addr,
            manifest,
            hosting,
            docker: DockerConfig::from_env(),
        })
    }
}

/// Eight hex characters, unique enough to keep this service's containers
/// apart from another instance's on the same host.
pub fn random_prefix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_prefix_shape() {
        let prefix = random_prefix();
        assert_eq!(prefix.len(), 8);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(prefix, random_prefix());
    }
}
