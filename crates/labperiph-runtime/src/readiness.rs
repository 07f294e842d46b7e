use labperiph_core::{CoreError, ExecutionResult, HealthPolicy, Result};
use std::future::Future;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Probe until `policy` is satisfied or its timeout budget runs out.
///
/// Probes run once per `policy.interval()`. On exhaustion the last probe
/// error is reported inside a `CoreError::Timeout`.
pub async fn wait_until_healthy<F, Fut>(policy: &HealthPolicy, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let deadline = Instant::now() + policy.timeout();
    let mut tracker = policy.tracker();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let outcome = probe().await;
        let last_error = outcome.as_ref().err().map(ToString::to_string);
        if tracker.record(outcome.is_ok()) {
            debug!(attempts, "Health check satisfied");
            return Ok(());
        }

        if Instant::now() + policy.interval() > deadline {
            return Err(CoreError::Timeout {
                operation: format!("health check after {attempts} attempts"),
                timeout: policy.timeout(),
                result: ExecutionResult::timed_out(String::new(), last_error.unwrap_or_default()),
            });
        }
        sleep(policy.interval()).await;
    }
}
