//! Timed execution of external processes.

use labperiph_core::{CoreError, ExecutionResult, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Run `program args...` to completion or until `timeout` elapses.
///
/// A process that completes (with any exit code) yields `Ok`. A process still
/// running at the deadline yields `CoreError::Timeout` whose result carries
/// exit code 124 and `finished_on_time = false`; the child is killed when the
/// abandoned wait is dropped.
pub async fn run_with_timeout(
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let description = describe(program, args);
    debug!(command = %description, ?timeout, "Running command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        CoreError::TransientInfra(format!("failed to spawn '{description}': {e}"))
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input).await.map_err(|e| {
                CoreError::TransientInfra(format!("failed to write stdin of '{description}': {e}"))
            })?;
        }
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = ExecutionResult::completed(
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            );
            debug!(command = %description, exit_code = result.exit_code, "Command finished");
            Ok(result)
        }
        Ok(Err(e)) => Err(CoreError::TransientInfra(format!(
            "failed to wait for '{description}': {e}"
        ))),
        Err(_) => {
            warn!(command = %description, ?timeout, "Command exceeded timeout");
            Err(CoreError::Timeout {
                operation: description,
                timeout,
                result: ExecutionResult::timed_out(String::new(), String::new()),
            })
        }
    }
}

pub(crate) fn describe(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
