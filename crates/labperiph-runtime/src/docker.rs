//! Docker CLI wrapper. Every invocation runs under a wall-clock timeout.

use crate::logs::LogFollower;
use crate::process::{describe, run_with_timeout};
use async_trait::async_trait;
use labperiph_core::{ContainerSpec, CoreError, ExecutionResult, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Container lifecycle operations the hosting service and orchestrator need.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fetch the image named by `spec`.
    async fn pull_image(&self, spec: &ContainerSpec) -> Result<()>;

    /// `docker run` the spec. A non-zero exit is an error.
    async fn run(&self, spec: &ContainerSpec, timeout: Duration) -> Result<ExecutionResult>;

    /// Run `cmd` inside a live container. Fails with `NotRunning` without
    /// attempting the exec when the container is down. The exit code of the
    /// command is returned as-is.
    async fn exec(&self, name: &str, timeout: Duration, cmd: &[String])
        -> Result<ExecutionResult>;

    /// Host port Docker bound for `container_port` of the spec's container.
    async fn matching_host_port(&self, spec: &ContainerSpec, container_port: u16) -> Result<u16>;

    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    async fn container_is_up(&self, name: &str) -> Result<bool>;

    /// Log in to `registry` with a token read from stdin.
    async fn login(&self, registry: &str, user: &str, token: &str) -> Result<()>;

    /// Follow the container's combined output.
    async fn follow_logs(&self, name: &str) -> Result<LogFollower>;
}

#[derive(Debug, Clone)]
pub struct DockerConfig {
    pub docker_bin: String,
    pub pull_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            pull_timeout: Duration::from_secs(600),
            command_timeout: Duration::from_secs(60),
        }
    }
}

impl DockerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bin) = std::env::var("DOCKER_BIN") {
            if !bin.trim().is_empty() {
                config.docker_bin = bin;
            }
        }
        config
    }
}

/// `ContainerRuntime` backed by the `docker` command line client.
#[derive(Debug, Clone, Default)]
pub struct DockerCli {
    config: DockerConfig,
}

impl DockerCli {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    async fn docker(
        &self,
        args: Vec<String>,
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        run_with_timeout(&self.config.docker_bin, &args, stdin, timeout).await
    }

    async fn docker_checked(&self, args: Vec<String>, timeout: Duration) -> Result<ExecutionResult> {
        let description = describe(&self.config.docker_bin, &args);
        self.docker(args, None, timeout)
            .await?
            .into_checked(description)
    }
}

/// Argument vector for `docker run`, in the order the CLI grammar expects:
/// `run [-d] --name N [-p hp:cp]* [--expose p]* [-P] [-v s:d]* [--env K=V]*
/// [--privileged] --rm [--network net] IMAGE [EXEC...]`.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if spec.detach {
        args.push("-d".to_string());
    }
    args.push("--name".to_string());
    args.push(spec.name.clone());
    for mapping in &spec.port_mappings {
        args.push("-p".to_string());
        args.push(mapping.clone());
    }
    if spec.port_mappings.is_empty() && !spec.expose_ports.is_empty() {
        for port in &spec.expose_ports {
            args.push("--expose".to_string());
            args.push(port.to_string());
        }
        args.push("-P".to_string());
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    for var in &spec.env {
        args.push("--env".to_string());
        args.push(var.clone());
    }
    if spec.privileged {
        args.push("--privileged".to_string());
    }
    args.push("--rm".to_string());
    if let Some(network) = spec.network.as_ref().filter(|n| !n.is_empty()) {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    args.push(spec.image_ref());
    args.extend(spec.exec_command.iter().cloned());
    args
}

pub fn rm_args(name: &str, force: bool) -> Vec<String> {
    let mut args = vec!["rm".to_string(), name.to_string()];
    if force {
        args.push("--force".to_string());
    }
    args
}

pub fn exec_args(name: &str, cmd: &[String]) -> Vec<String> {
    let mut args = vec!["exec".to_string(), "-i".to_string(), name.to_string()];
    args.extend(cmd.iter().cloned());
    args
}

/// Parse `docker port` output such as `0.0.0.0:49153\n[::]:49153`.
pub fn parse_host_port(output: &str) -> Option<u16> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| line.rsplit(':').next()?.parse().ok())
}

/// Whether `name` appears in a `docker ps` name listing. Docker reports some
/// names with a leading `/`.
pub fn listing_contains(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .flat_map(|line| line.split(','))
        .map(|entry| entry.trim().trim_start_matches('/'))
        .any(|entry| entry == name)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn pull_image(&self, spec: &ContainerSpec) -> Result<()> {
        let image = spec.image_ref();
        info!(image = %image, "Pulling image");
        self.docker_checked(vec!["pull".to_string(), image], self.config.pull_timeout)
            .await?;
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec, timeout: Duration) -> Result<ExecutionResult> {
        info!(container = %spec.name, image = %spec.image_ref(), "Running container");
        self.docker_checked(run_args(spec), timeout).await
    }

    async fn exec(
        &self,
        name: &str,
        timeout: Duration,
        cmd: &[String],
    ) -> Result<ExecutionResult> {
        if !self.container_is_up(name).await? {
            return Err(CoreError::NotRunning(format!(
                "container {name} is not up, skipping exec"
            )));
        }
        self.docker(exec_args(name, cmd), None, timeout).await
    }

    async fn matching_host_port(&self, spec: &ContainerSpec, container_port: u16) -> Result<u16> {
        let result = self
            .docker_checked(
                vec![
                    "port".to_string(),
                    spec.name.clone(),
                    format!("{container_port}/tcp"),
                ],
                self.config.command_timeout,
            )
            .await?;

        let port = parse_host_port(&result.stdout).ok_or_else(|| {
            CoreError::TransientInfra(format!(
                "no host port mapped for {}:{container_port} (output: {:?})",
                spec.name,
                result.stdout.trim()
            ))
        })?;
        debug!(container = %spec.name, container_port, host_port = port, "Resolved host port");
        Ok(port)
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        info!(container = %name, force, "Removing container");
        self.docker_checked(rm_args(name, force), self.config.command_timeout)
            .await?;
        Ok(())
    }

    async fn container_is_up(&self, name: &str) -> Result<bool> {
        let result = self
            .docker_checked(
                vec![
                    "ps".to_string(),
                    "--format".to_string(),
                    "{{.Names}}".to_string(),
                ],
                self.config.command_timeout,
            )
            .await?;
        Ok(listing_contains(&result.stdout, name))
    }

    async fn login(&self, registry: &str, user: &str, token: &str) -> Result<()> {
        let args = vec![
            "login".to_string(),
            "-u".to_string(),
            user.to_string(),
            "--password-stdin".to_string(),
            registry.to_string(),
        ];
        let description = describe(&self.config.docker_bin, &args);
        self.docker(args, Some(token.as_bytes()), self.config.command_timeout)
            .await?
            .into_checked(description)?;
        info!(registry = %registry, "Logged in to registry");
        Ok(())
    }

    async fn follow_logs(&self, name: &str) -> Result<LogFollower> {
        let child = Command::new(&self.config.docker_bin)
            .args(["logs", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CoreError::TransientInfra(format!("failed to follow logs of {name}: {e}"))
            })?;
        LogFollower::from_child(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// A `docker` stand-in script; `ps` lists `/alive` and `exec` echoes its args.
    fn fake_docker(dir: &TempDir) -> DockerCli {
        let path = dir.path().join("docker");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             case \"$1\" in\n\
               ps) echo /alive; echo other ;;\n\
               exec) shift; echo \"$@\" ;;\n\
               port) echo 0.0.0.0:49153; echo '[::]:49153' ;;\n\
               rm) [ \"$2\" = alive ] || { echo \"no such container: $2\" >&2; exit 1; } ;;\n\
               *) exit 0 ;;\n\
             esac\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        DockerCli::new(DockerConfig {
            docker_bin: path.to_string_lossy().into_owned(),
            ..Default::default()
        })
    }

    #[test]
    fn test_run_args_full_grammar() {
        let spec = ContainerSpec {
            image: "tool:1".to_string(),
            name: "ctr-foo-0".to_string(),
            registry: "gcr.io/lab".to_string(),
            exec_command: strings(&["/bin/tool", "--serve"]),
            env: strings(&["A=1", "B=2"]),
            volumes: strings(&["/tmp/out:/logs"]),
            port_mappings: strings(&["8080:80"]),
            expose_ports: vec![],
            detach: true,
            privileged: true,
            network: Some("host".to_string()),
        };

        assert_eq!(
            run_args(&spec),
            strings(&[
                "run",
                "-d",
                "--name",
                "ctr-foo-0",
                "-p",
                "8080:80",
                "-v",
                "/tmp/out:/logs",
                "--env",
                "A=1",
                "--env",
                "B=2",
                "--privileged",
                "--rm",
                "--network",
                "host",
                "gcr.io/lab/tool:1",
                "/bin/tool",
                "--serve",
            ])
        );
    }

    #[test]
    fn test_run_args_minimal() {
        let spec = ContainerSpec::new("c1", "img");
        assert_eq!(run_args(&spec), strings(&["run", "--name", "c1", "--rm", "img"]));
    }

    #[test]
    fn test_run_args_ephemeral_exposure() {
        let spec = ContainerSpec {
            expose_ports: vec![80, 443],
            ..ContainerSpec::new("c1", "img")
        };
        assert_eq!(
            run_args(&spec),
            strings(&[
                "run", "--name", "c1", "--expose", "80", "--expose", "443", "-P", "--rm", "img",
            ])
        );
    }

    #[test]
    fn test_run_args_explicit_ports_suppress_exposure() {
        let spec = ContainerSpec {
            port_mappings: strings(&["1:2"]),
            expose_ports: vec![80],
            ..ContainerSpec::new("c1", "img")
        };
        let args = run_args(&spec);
        assert!(!args.contains(&"-P".to_string()));
        assert!(!args.contains(&"--expose".to_string()));
    }

    #[test]
    fn test_rm_and_exec_args() {
        assert_eq!(rm_args("c1", false), strings(&["rm", "c1"]));
        assert_eq!(rm_args("c1", true), strings(&["rm", "c1", "--force"]));
        assert_eq!(
            exec_args("c1", &strings(&["ls", "-l"])),
            strings(&["exec", "-i", "c1", "ls", "-l"])
        );
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_host_port("0.0.0.0:49153\n[::]:49153\n"), Some(49153));
        assert_eq!(parse_host_port("\n"), None);
        assert_eq!(parse_host_port("garbage"), None);
    }

    #[test]
    fn test_listing_contains_trims_leading_slash() {
        assert!(listing_contains("/alpha\nbeta\n", "alpha"));
        assert!(listing_contains("/alpha\nbeta\n", "beta"));
        assert!(!listing_contains("/alpha\nbeta\n", "alp"));
    }

    #[tokio::test]
    async fn test_exec_fails_fast_when_container_down() {
        let dir = TempDir::new().unwrap();
        let docker = fake_docker(&dir);

        let err = docker
            .exec("missing", Duration::from_secs(5), &strings(&["true"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_exec_runs_in_live_container() {
        let dir = TempDir::new().unwrap();
        let docker = fake_docker(&dir);

        let result = docker
            .exec("alive", Duration::from_secs(5), &strings(&["echo", "hi"]))
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "-i alive echo hi");
    }

    #[tokio::test]
    async fn test_matching_host_port_and_remove() {
        let dir = TempDir::new().unwrap();
        let docker = fake_docker(&dir);
        let spec = ContainerSpec::new("alive", "img");

        assert_eq!(docker.matching_host_port(&spec, 80).await.unwrap(), 49153);
        assert!(docker.remove("alive", true).await.is_ok());

        let err = docker.remove("ghost", false).await.unwrap_err();
        assert!(matches!(err, CoreError::TransientInfra(_)));
        assert!(err.to_string().contains("exit code 1"));
    }

    #[tokio::test]
    async fn test_container_is_up() {
        let dir = TempDir::new().unwrap();
        let docker = fake_docker(&dir);
        assert!(docker.container_is_up("alive").await.unwrap());
        assert!(docker.container_is_up("other").await.unwrap());
        assert!(!docker.container_is_up("ghost").await.unwrap());
    }
}
