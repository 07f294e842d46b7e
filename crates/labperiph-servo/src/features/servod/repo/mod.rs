use crate::ssh::SshPool;
use labperiph_core::{ExecutionResult, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs servod control commands on labstations through the SSH pool.
pub struct ServodCommandRepo {
    pool: Arc<dyn SshPool>,
}

impl ServodCommandRepo {
    pub fn new(pool: Arc<dyn SshPool>) -> Self {
        Self { pool }
    }

    /// Run `command` on `host`. The connection goes back to the pool whether
    /// or not the command succeeded.
    pub async fn run(&self, host: &str, command: &str, timeout: Duration) -> Result<ExecutionResult> {
        let conn = self.pool.get(host).await?;
        debug!(host = %host, command = %command, "Running servod command");
        let result = conn.run(command, timeout).await;
        self.pool.put(host, conn).await;
        result.map_err(|e| e.context(format!("{host}: {command}")))
    }
}
