use crate::features::servod::repo::ServodCommandRepo;
use crate::features::servod::service::{self, ServodService};
use crate::rpc::{RpcCaller, Value};
use crate::ssh::SshPool;
use crate::tunnel::TunnelProxy;
use labperiph_core::{DaemonEndpoint, DaemonStatus, Result, ServodOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Lifecycle and in-band control of servod on remote labstations.
pub struct DaemonLifecycleController {
    service: ServodService,
    tunnels: TunnelProxy,
    rpc: RpcCaller,
}

impl DaemonLifecycleController {
    pub fn new(pool: Arc<dyn SshPool>) -> Self {
        let repo = Arc::new(ServodCommandRepo::new(pool.clone()));
        Self {
            service: ServodService::new(repo),
            tunnels: TunnelProxy::new(pool),
            rpc: RpcCaller,
        }
    }

    pub async fn get_status(&self, host: &str, port: i32) -> Result<DaemonStatus> {
        info!(host = %host, port = port, "Received servod status request");
        self.service.status(&DaemonEndpoint::new(host, port)).await
    }

    pub async fn start(&self, host: &str, port: i32, params: &[String]) -> Result<()> {
        info!(host = %host, port = port, params = ?params, "Received servod start request");
        self.service
            .start(&DaemonEndpoint::new(host, port), params)
            .await
    }

    /// Start with parameters derived from `options`.
    pub async fn start_with_options(&self, host: &str, options: &ServodOptions) -> Result<()> {
        let params = self.generate_params(options);
        self.start(host, options.servod_port, &params).await
    }

    pub async fn stop(&self, host: &str, port: i32) -> Result<()> {
        info!(host = %host, port = port, "Received servod stop request");
        self.service.stop(&DaemonEndpoint::new(host, port)).await
    }

    pub fn generate_params(&self, options: &ServodOptions) -> Vec<String> {
        service::generate_params(options)
    }

    /// Issue one RPC to the servod on `host:port` through a short-lived tunnel.
    pub async fn call(
        &self,
        host: &str,
        port: i32,
        method: &str,
        args: &[Value],
        timeout: Duration,
    ) -> Result<Value> {
        info!(host = %host, port = port, method = %method, "Received servod call request");
        let tunnel = self.tunnels.open(host, port).await?;
        let addr = tunnel.local_addr().to_string();
        let result = self.rpc.call(&addr, timeout, method, args).await;
        tunnel.close();
        result.map_err(|e| e.context(format!("servod {host}:{port}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{BoxedStream, MockSshConnection, MockSshPool, SshConnection};
    use crate::rpc::test_server::{answer, value_reply};
    use labperiph_core::ExecutionResult;

    fn controller_with(conn: MockSshConnection) -> DaemonLifecycleController {
        let conn: Arc<dyn SshConnection> = Arc::new(conn);
        let mut pool = MockSshPool::new();
        pool.expect_get().returning(move |_| Ok(conn.clone()));
        pool.expect_put().returning(|_, _| ());
        DaemonLifecycleController::new(Arc::new(pool))
    }

    #[tokio::test]
    async fn test_get_status_running() {
        let mut conn = MockSshConnection::new();
        conn.expect_run()
            .withf(|command, _| command.to_string() == "status servod PORT=9901")
            .returning(|_, _| {
                Ok(ExecutionResult::completed(
                    0,
                    "servod start/running".to_string(),
                    String::new(),
                ))
            });
        let controller = controller_with(conn);
        assert_eq!(
            controller.get_status("labstation-1", 9901).await.unwrap(),
            DaemonStatus::Running
        );
    }

    #[tokio::test]
    async fn test_start_with_options_is_idempotent() {
        let mut conn = MockSshConnection::new();
        conn.expect_run().times(1).returning(|_, _| {
            Ok(ExecutionResult::completed(
                0,
                "start/running".to_string(),
                String::new(),
            ))
        });
        let controller = controller_with(conn);
        let options = ServodOptions {
            servod_port: 9999,
            dut_board: "eve".to_string(),
            ..Default::default()
        };
        controller
            .start_with_options("labstation-1", &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_call_goes_through_tunnel() {
        let mut conn = MockSshConnection::new();
        conn.expect_dial()
            .withf(|addr| addr.to_string() == "127.0.0.1:9999")
            .returning(|_| {
                let (near, mut far) = tokio::io::duplex(8192);
                tokio::spawn(async move {
                    let request = answer(&mut far, &value_reply("<string>on</string>")).await;
                    assert!(request.contains("/RPC2"));
                    assert!(request.contains("<methodName>get</methodName>"));
                });
                Ok(Box::new(near) as BoxedStream)
            });

        let controller = controller_with(conn);
        let value = controller
            .call(
                "labstation-1",
                9999,
                "get",
                &[Value::from("dut_power")],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(value, Value::from("on"));
    }
}
