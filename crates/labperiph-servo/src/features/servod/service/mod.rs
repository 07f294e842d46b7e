use crate::features::servod::repo::ServodCommandRepo;
use crate::ssh::remote_command;
use labperiph_core::{CoreError, DaemonEndpoint, DaemonStatus, ExecutionResult, Result, ServodOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long `servodtool` waits for a freshly started servod to become active.
pub const READY_WAIT: Duration = Duration::from_secs(60);
/// Pause after `stop servod` so the daemon can release the servo.
pub const STOP_DRAIN: Duration = Duration::from_secs(3);
/// Budget for a single short servod control command over SSH.
pub const SSH_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

const RUNNING_MARKER: &str = "start/running";
const STOPPING_MARKER: &str = "stop/waiting";
const UNKNOWN_INSTANCE_MARKER: &str = "unknown instance";

/// Interpret the output of `status servod PORT=<port>`.
pub fn parse_status(result: &ExecutionResult) -> Result<DaemonStatus> {
    if result.exit_code == 0 {
        let stdout = result.stdout.to_lowercase();
        if stdout.contains(RUNNING_MARKER) {
            return Ok(DaemonStatus::Running);
        }
        if stdout.contains(STOPPING_MARKER) {
            return Ok(DaemonStatus::Stopping);
        }
    } else if result.stderr.to_lowercase().contains(UNKNOWN_INSTANCE_MARKER) {
        return Ok(DaemonStatus::NotRunning);
    }

    Err(CoreError::TransientInfra(format!(
        "unexpected servod status (exit code {}): stdout={:?} stderr={:?}",
        result.exit_code,
        result.stdout.trim(),
        result.stderr.trim()
    )))
}

/// Map start options to `start servod` arguments, in a fixed order.
pub fn generate_params(options: &ServodOptions) -> Vec<String> {
    let mut params = Vec::new();
    if options.servod_port > 0 {
        params.push(format!("PORT={}", options.servod_port));
    }
    if !options.dut_board.is_empty() {
        params.push(format!("BOARD={}", options.dut_board));
        if !options.dut_model.is_empty() {
            params.push(format!("MODEL={}", options.dut_model));
        }
    }
    if !options.servo_serial.is_empty() {
        params.push(format!("SERIAL={}", options.servo_serial));
    }
    if options.servo_dual {
        params.push("DUAL_V4=1".to_string());
    }
    if options.use_cr50_config {
        params.push("CONFIG=cr50.xml".to_string());
    }
    if options.recovery_mode {
        params.push("REC_MODE=1".to_string());
    }
    params
}

pub struct ServodService {
    repo: Arc<ServodCommandRepo>,
}

impl ServodService {
    pub fn new(repo: Arc<ServodCommandRepo>) -> Self {
        Self { repo }
    }

    pub async fn status(&self, endpoint: &DaemonEndpoint) -> Result<DaemonStatus> {
        let command = format!("status servod PORT={}", endpoint.port);
        let result = self
            .repo
            .run(&endpoint.host, &command, SSH_COMMAND_TIMEOUT)
            .await?;
        parse_status(&result).map_err(|e| e.context(format!("servod {endpoint}")))
    }

    /// Start servod unless it is already running, then wait for it to become
    /// active. No step is retried.
    pub async fn start(&self, endpoint: &DaemonEndpoint, params: &[String]) -> Result<()> {
        if self.status(endpoint).await? == DaemonStatus::Running {
            info!(endpoint = %endpoint, "Servod already running");
            return Ok(());
        }

        let start = remote_command("start servod", params);
        self.repo
            .run(&endpoint.host, &start, SSH_COMMAND_TIMEOUT)
            .await?
            .into_checked(format!("{} on {}", start, endpoint.host))?;

        let wait = format!(
            "servodtool instance wait-for-active -p {} --timeout {}",
            endpoint.port,
            READY_WAIT.as_secs()
        );
        self.repo
            .run(&endpoint.host, &wait, READY_WAIT + SSH_COMMAND_TIMEOUT)
            .await?
            .into_checked(format!("{} on {}", wait, endpoint.host))?;

        info!(endpoint = %endpoint, "Servod started");
        Ok(())
    }

    /// Stop servod unless it is already gone. The drain pause always runs
    /// after a stop is issued; the daemon is not re-checked.
    pub async fn stop(&self, endpoint: &DaemonEndpoint) -> Result<()> {
        let status = self.status(endpoint).await?;
        if status == DaemonStatus::NotRunning {
            info!(endpoint = %endpoint, "Servod not running");
            return Ok(());
        }

        let stop = format!("stop servod PORT={}", endpoint.port);
        let result = self.repo.run(&endpoint.host, &stop, SSH_COMMAND_TIMEOUT).await?;
        if !result.success() {
            warn!(
                endpoint = %endpoint,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "Stop servod returned an error"
            );
        }
        tokio::time::sleep(STOP_DRAIN).await;
        result.into_checked(format!("{} on {}", stop, endpoint.host))?;

        info!(endpoint = %endpoint, previous = %status, "Servod stopped");
        Ok(())
    }
}
