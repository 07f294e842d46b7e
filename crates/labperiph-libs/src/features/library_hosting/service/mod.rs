use crate::features::library_hosting::repo::{ContainerRuntime, RunningRepository};
use crate::features::registration::service::LibraryRegistry;
use crate::shared::error::{LibsError, LibsResult};
use crate::shared::types::{
    FindLibRequest, InstanceState, LibHandle, LibraryRegistration, RunningLibraryInstance,
};
use chrono::Utc;
use labperiph_core::{ContainerSpec, CoreError, HealthPolicy};
use labperiph_runtime::wait_until_healthy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Timing and naming knobs for hosted containers
#[derive(Debug, Clone)]
pub struct HostingOptions {
    /// Prepended to every container name so concurrent services never collide.
    pub container_prefix: String,
    /// Parent of the per-instance log directories.
    pub output_dir: PathBuf,
    /// Total budget for the readiness ping.
    pub connection_timeout: Duration,
    pub ping_interval: Duration,
    /// Wall-clock limit for a single ping command.
    pub ping_timeout: Duration,
    /// Wall-clock limit for `docker run`.
    pub run_timeout: Duration,
}

impl Default for HostingOptions {
    fn default() -> Self {
        Self {
            container_prefix: "labperiph".to_string(),
            output_dir: PathBuf::from("/tmp/labperiph/libs"),
            connection_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(5),
            run_timeout: Duration::from_secs(120),
        }
    }
}

/// Service for hosting library containers
pub struct LibraryHostingService {
    registry: Arc<LibraryRegistry>,
    running: Arc<dyn RunningRepository>,
    runtime: Arc<dyn ContainerRuntime>,
    options: HostingOptions,
}

impl LibraryHostingService {
    pub fn new(
        registry: Arc<LibraryRegistry>,
        running: Arc<dyn RunningRepository>,
        runtime: Arc<dyn ContainerRuntime>,
        options: HostingOptions,
    ) -> Self {
        Self {
            registry,
            running,
            runtime,
            options,
        }
    }

    /// Return a running instance of the library, starting one if none exists.
    pub async fn find_lib(&self, request: FindLibRequest) -> LibsResult<LibHandle> {
        if request.name.is_empty() {
            return Err(LibsError::InvalidRequest(
                "library name cannot be empty".to_string(),
            ));
        }

        if let Some(instance) = self.running.find_by_name(&request.name).await? {
            info!(lib = %request.name, lib_id = %instance.id, "Found running library");
            return Ok(instance.handle());
        }

        self.start_lib(request).await
    }

    /// Start a fresh instance of a registered library.
    pub async fn start_lib(&self, request: FindLibRequest) -> LibsResult<LibHandle> {
        let registration = self.registry.lookup(&request.name).await?;

        // Taken before anything is created so concurrent starts never share a name.
        let counter = self.running.next_counter(&registration.name).await?;
        let id = format!("{}.{}", registration.name, counter);
        let container_name = format!(
            "{}-{}-{}",
            self.options.container_prefix, registration.name, counter
        );

        let spec = self
            .container_spec(&registration, &request, &id, &container_name)
            .await?;

        info!(
            lib = %registration.name,
            lib_id = %id,
            container = %container_name,
            version = %request.version,
            "Starting library container"
        );

        self.runtime
            .pull_image(&spec)
            .await
            .map_err(|e| start_error(&id, "pull image", e))?;
        self.runtime
            .run(&spec, self.options.run_timeout)
            .await
            .map_err(|e| start_error(&id, "run container", e))?;

        let port = if let Some(container_port) = registration.container_port() {
            match self.runtime.matching_host_port(&spec, container_port).await {
                Ok(port) => i32::from(port),
                Err(error) => {
                    self.discard_container(&container_name).await;
                    return Err(start_error(&id, "resolve host port", error));
                }
            }
        } else {
            0
        };

        let instance = RunningLibraryInstance {
            id: id.clone(),
            container_name: container_name.clone(),
            registration: registration.clone(),
            port,
            state: InstanceState::Starting,
            started_at: Utc::now(),
        };
        self.running.insert(instance.clone()).await?;

        if !registration.ping.is_empty() {
            if let Err(error) = self.wait_for_ping(&container_name, &registration.ping).await {
                warn!(lib_id = %id, container = %container_name, error = %error, "Library never became ready");
                self.discard_container(&container_name).await;
                self.running.remove(&id).await?;
                return Err(start_error(&id, "ping", error));
            }
        }

        // A concurrent kill removes the entry; its handle must not be returned.
        if !self.running.set_state(&id, InstanceState::Ready).await?
            || !self.running.set_state(&id, InstanceState::Running).await?
        {
            warn!(lib_id = %id, container = %container_name, "Library killed while starting");
            return Err(LibsError::ContainerStart(format!(
                "{id}: killed while starting"
            )));
        }
        info!(lib_id = %id, port, "Library ready");
        Ok(instance.handle())
    }

    /// Kill an instance. Unknown or empty ids are ignored, and a container that
    /// cannot be removed (usually one that already exited) still leaves the map.
    pub async fn kill_lib(&self, id: &str) -> LibsResult<()> {
        let instance = if id.is_empty() {
            None
        } else {
            self.running.get(id).await?
        };
        let Some(instance) = instance else {
            info!(lib_id = %id, "Kill requested for unknown library instance");
            return Ok(());
        };

        if let Err(error) = self.runtime.remove(&instance.container_name, true).await {
            warn!(
                lib_id = %id,
                container = %instance.container_name,
                error = %error,
                "Failed to remove library container"
            );
        }
        self.running.set_state(id, InstanceState::Stopped).await?;
        self.running.remove(id).await?;

        info!(lib_id = %id, container = %instance.container_name, "Library killed");
        Ok(())
    }

    pub async fn list_running(&self) -> LibsResult<Vec<RunningLibraryInstance>> {
        self.running.list().await
    }

    async fn container_spec(
        &self,
        registration: &LibraryRegistration,
        request: &FindLibRequest,
        id: &str,
        container_name: &str,
    ) -> LibsResult<ContainerSpec> {
        let mut spec = ContainerSpec::new(container_name, registration.image.clone());
        spec.registry = registration.registry.clone();
        spec.exec_command = registration.exec_cmd.clone();
        spec.detach = true;

        if let Some(port) = registration.container_port() {
            spec.expose_ports.push(port);
        }

        if !registration.log_dir.is_empty() {
            let host_dir = self.options.output_dir.join(id);
            tokio::fs::create_dir_all(&host_dir).await.map_err(|e| {
                LibsError::ContainerStart(format!(
                    "{id}: failed to create log directory {}: {e}",
                    host_dir.display()
                ))
            })?;
            spec.volumes
                .push(format!("{}:{}", host_dir.display(), registration.log_dir));
        }

        if registration.requires_servo() {
            let servo = request.servo.as_ref().ok_or_else(|| {
                LibsError::ContainerStart(format!(
                    "{id}: library {} requires a servo but none was provided",
                    registration.name
                ))
            })?;
            spec.env.push(format!("SERVO_HOST={}", servo.host));
            spec.env.push(format!("SERVO_PORT={}", servo.port));
        }

        Ok(spec)
    }

    async fn wait_for_ping(&self, container_name: &str, ping: &str) -> labperiph_core::Result<()> {
        let policy =
            HealthPolicy::first_success(self.options.ping_interval, self.options.connection_timeout);
        let cmd = vec!["sh".to_string(), "-c".to_string(), ping.to_string()];
        let runtime = self.runtime.clone();
        let timeout = self.options.ping_timeout;

        wait_until_healthy(&policy, || {
            let runtime = runtime.clone();
            let cmd = cmd.clone();
            async move {
                runtime
                    .exec(container_name, timeout, &cmd)
                    .await?
                    .into_checked("ping")
                    .map(|_| ())
            }
        })
        .await
    }

    async fn discard_container(&self, container_name: &str) {
        if let Err(error) = self.runtime.remove(container_name, true).await {
            warn!(container = %container_name, error = %error, "Failed to remove container");
        }
    }
}

fn start_error(id: &str, step: &str, error: CoreError) -> LibsError {
    LibsError::ContainerStart(format!("{id}: {step}: {error}"))
}
