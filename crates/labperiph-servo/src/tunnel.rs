//! Local TCP listener forwarding to a port only reachable from a remote host.

use crate::ssh::{SshConnection, SshPool};
use labperiph_core::{CoreError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct TunnelProxy {
    pool: Arc<dyn SshPool>,
}

impl TunnelProxy {
    pub fn new(pool: Arc<dyn SshPool>) -> Self {
        Self { pool }
    }

    /// Bind `127.0.0.1:0` and forward every accepted connection to
    /// `127.0.0.1:<remote_port>` on `host`. Returns once the listener is bound;
    /// forwarding runs in the background until the handle is closed.
    pub async fn open(&self, host: &str, remote_port: i32) -> Result<TunnelHandle> {
        let conn = self.pool.get(host).await?;

        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(e) => {
                self.pool.put(host, conn).await;
                return Err(CoreError::Io(format!("failed to bind tunnel listener: {e}")));
            }
        };
        let local_addr = listener.local_addr()?;
        let remote_addr = format!("127.0.0.1:{remote_port}");
        let token = CancellationToken::new();

        info!(host = %host, local = %local_addr, remote = %remote_addr, "Opened tunnel");

        tokio::spawn(forward_loop(
            listener,
            self.pool.clone(),
            host.to_string(),
            conn,
            remote_addr,
            token.clone(),
        ));

        Ok(TunnelHandle { local_addr, token })
    }
}

async fn forward_loop(
    listener: TcpListener,
    pool: Arc<dyn SshPool>,
    host: String,
    conn: Arc<dyn SshConnection>,
    remote_addr: String,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(host = %host, peer = %peer, "Tunnel accepted connection");
                    tokio::spawn(forward_connection(
                        stream,
                        conn.clone(),
                        remote_addr.clone(),
                        token.child_token(),
                    ));
                }
                Err(error) => {
                    warn!(host = %host, error = %error, "Tunnel accept failed");
                    break;
                }
            },
        }
    }

    pool.put(&host, conn).await;
    debug!(host = %host, remote = %remote_addr, "Tunnel closed");
}

async fn forward_connection(
    mut local: TcpStream,
    conn: Arc<dyn SshConnection>,
    remote_addr: String,
    token: CancellationToken,
) {
    let mut remote = match conn.dial(&remote_addr).await {
        Ok(remote) => remote,
        Err(error) => {
            warn!(remote = %remote_addr, error = %error, "Tunnel dial failed");
            return;
        }
    };

    tokio::select! {
        _ = token.cancelled() => {}
        copied = copy_bidirectional(&mut local, &mut remote) => {
            if let Err(error) = copied {
                debug!(remote = %remote_addr, error = %error, "Tunnel connection ended with error");
            }
        }
    }
}

/// An open local-to-remote forward. Closing it, or dropping it, stops
/// accepting and tears down live connections.
#[derive(Debug)]
pub struct TunnelHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
}

impl TunnelHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
