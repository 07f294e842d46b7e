//! One-shot XML-RPC calls with a caller-supplied deadline.

use async_trait::async_trait;
use labperiph_core::{CoreError, ExecutionResult, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

pub use xmlrpc::Value;

/// Path servod serves XML-RPC on.
pub const RPC_PATH: &str = "/RPC2";

#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value>;
}

/// XML-RPC over HTTP. Each call runs the blocking `xmlrpc` transport on the
/// blocking pool with the deadline applied to the HTTP client.
pub struct XmlRpcClient {
    url: String,
    timeout: Duration,
}

impl XmlRpcClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        Self {
            url: format!("http://{host}:{port}{RPC_PATH}"),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcClient for XmlRpcClient {
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let url = self.url.clone();
        let timeout = self.timeout;
        let name = method.to_string();
        let args = args.to_vec();

        tokio::task::spawn_blocking(move || {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| CoreError::TransientInfra(format!("failed to build rpc client: {e}")))?;
            let request = args
                .into_iter()
                .fold(xmlrpc::Request::new(&name), |request, arg| request.arg(arg));
            request
                .call(client.post(url.as_str()))
                .map_err(|e| map_xmlrpc_error(&name, e))
        })
        .await
        .map_err(|e| CoreError::TransientInfra(format!("rpc {method} task failed: {e}")))?
    }
}

fn map_xmlrpc_error(method: &str, error: xmlrpc::Error) -> CoreError {
    match error.fault() {
        Some(fault) => CoreError::TransientInfra(format!(
            "rpc {method} fault {}: {}",
            fault.fault_code, fault.fault_string
        )),
        None => CoreError::TransientInfra(format!("rpc {method}: {error}")),
    }
}

/// Split `host:port`, accepting bracketed IPv6 literals.
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Ok((socket.ip().to_string(), socket.port()));
    }
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| CoreError::Validation(format!("address {addr:?} has no port")))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| CoreError::Validation(format!("address {addr:?} has invalid port: {e}")))?;
    if host.is_empty() {
        return Err(CoreError::Validation(format!("address {addr:?} has no host")));
    }
    Ok((host.to_string(), port))
}

/// Issues single RPC calls to an address, typically a tunnel's local end.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcCaller;

impl RpcCaller {
    pub async fn call(
        &self,
        addr: &str,
        timeout: Duration,
        method: &str,
        args: &[Value],
    ) -> Result<Value> {
        let (host, port) = split_host_port(addr)?;
        let client = XmlRpcClient::new(&host, port, timeout);
        debug!(addr = %addr, url = %client.url(), method = %method, "Issuing rpc call");
        self.call_with(&client, addr, timeout, method, args).await
    }

    /// Issue one call through `client`, bounded by `timeout`. Errors are
    /// annotated with the target address and method.
    pub async fn call_with(
        &self,
        client: &dyn RpcClient,
        addr: &str,
        timeout: Duration,
        method: &str,
        args: &[Value],
    ) -> Result<Value> {
        match tokio::time::timeout(timeout, client.call(method, args)).await {
            Ok(result) => result.map_err(|e| e.context(format!("{addr} {method}"))),
            Err(_) => Err(CoreError::Timeout {
                operation: format!("rpc {method} to {addr}"),
                timeout,
                result: ExecutionResult::timed_out(String::new(), String::new()),
            }),
        }
    }
}
