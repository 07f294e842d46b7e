//! SSH command execution and TCP dialing, consumed as a capability.
//!
//! The default implementation shells out to the OpenSSH client: commands run
//! as `ssh user@host <command>` and remote TCP endpoints are reached with
//! `ssh -W`, whose stdin/stdout become the byte stream.

use async_trait::async_trait;
use labperiph_core::{CoreError, ExecutionResult, Result};
use labperiph_runtime::{run_with_timeout, shell_quote};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

/// Bidirectional byte stream to a remote endpoint.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// One SSH session to a host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SshConnection: Send + Sync {
    /// Run a shell command line on the remote host.
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecutionResult>;

    /// Open a TCP stream to `remote_addr` as seen from the remote host.
    async fn dial(&self, remote_addr: &str) -> Result<BoxedStream>;
}

/// Source of SSH connections with Get/Put semantics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SshPool: Send + Sync {
    async fn get(&self, host: &str) -> Result<Arc<dyn SshConnection>>;

    async fn put(&self, host: &str, conn: Arc<dyn SshConnection>);
}

/// Join a program and arguments into a remote shell command line, quoting
/// only the words that need it.
pub fn remote_command(program: &str, args: &[String]) -> String {
    let mut words = vec![program.to_string()];
    words.extend(args.iter().map(|arg| quote_if_needed(arg)));
    words.join(" ")
}

fn quote_if_needed(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-=./:,@+%".contains(c));
    if plain {
        word.to_string()
    } else {
        shell_quote(word)
    }
}

#[derive(Debug, Clone)]
pub struct OpenSshConfig {
    pub ssh_bin: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for OpenSshConfig {
    fn default() -> Self {
        Self {
            ssh_bin: "ssh".to_string(),
            user: "root".to_string(),
            port: 22,
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl OpenSshConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bin) = std::env::var("SSH_BIN") {
            config.ssh_bin = bin;
        }
        if let Ok(user) = std::env::var("SSH_USER") {
            config.user = user;
        }
        if let Some(port) = std::env::var("SSH_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.port = port;
        }
        config.identity_file = std::env::var("SSH_IDENTITY_FILE")
            .ok()
            .filter(|path| !path.is_empty());
        config
    }

    /// Common `ssh` arguments up to and including the destination.
    pub fn base_args(&self, host: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(format!("{}@{}", self.user, host));
        args
    }
}

pub struct OpenSshConnection {
    host: String,
    config: OpenSshConfig,
}

impl OpenSshConnection {
    pub fn new(host: impl Into<String>, config: OpenSshConfig) -> Self {
        Self {
            host: host.into(),
            config,
        }
    }
}

#[async_trait]
impl SshConnection for OpenSshConnection {
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecutionResult> {
        let mut args = self.config.base_args(&self.host);
        args.push(command.to_string());
        run_with_timeout(&self.config.ssh_bin, &args, None, timeout)
            .await
            .map_err(|e| e.context(format!("ssh {}", self.host)))
    }

    async fn dial(&self, remote_addr: &str) -> Result<BoxedStream> {
        let mut args = vec!["-W".to_string(), remote_addr.to_string()];
        args.extend(self.config.base_args(&self.host));

        let mut child = Command::new(&self.config.ssh_bin)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CoreError::TransientInfra(format!(
                    "failed to dial {remote_addr} via {}: {e}",
                    self.host
                ))
            })?;

        let reader = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Io("ssh stdout is not piped".to_string()))?;
        let writer = child
            .stdin
            .take()
            .ok_or_else(|| CoreError::Io("ssh stdin is not piped".to_string()))?;

        debug!(host = %self.host, remote = %remote_addr, "Dialed remote endpoint");
        Ok(Box::new(ProcessStream {
            _child: child,
            reader,
            writer,
        }))
    }
}

/// Byte stream carried over a child process's stdout (read) and stdin (write).
struct ProcessStream {
    _child: Child,
    reader: ChildStdout,
    writer: ChildStdin,
}

impl AsyncRead for ProcessStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProcessStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

/// Pool of OpenSSH connections, one cached handle per host.
pub struct OpenSshPool {
    config: OpenSshConfig,
    idle: Mutex<HashMap<String, Arc<dyn SshConnection>>>,
}

impl OpenSshPool {
    pub fn new(config: OpenSshConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SshPool for OpenSshPool {
    async fn get(&self, host: &str) -> Result<Arc<dyn SshConnection>> {
        if host.is_empty() {
            return Err(CoreError::Validation("ssh host cannot be empty".to_string()));
        }
        let mut idle = self.idle.lock().await;
        if let Some(conn) = idle.remove(host) {
            return Ok(conn);
        }
        Ok(Arc::new(OpenSshConnection::new(host, self.config.clone())))
    }

    async fn put(&self, host: &str, conn: Arc<dyn SshConnection>) {
        let mut idle = self.idle.lock().await;
        idle.insert(host.to_string(), conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_command_plain_words() {
        let args = vec!["PORT=9999".to_string(), "BOARD=eve".to_string()];
        assert_eq!(
            remote_command("start servod", &args),
            "start servod PORT=9999 BOARD=eve"
        );
    }

    #[test]
    fn test_remote_command_quotes_special_words() {
        let args = vec!["a b".to_string(), "$x".to_string(), String::new()];
        assert_eq!(remote_command("echo", &args), r#"echo "a b" "\$x" """#);
    }

    #[test]
    fn test_base_args() {
        let config = OpenSshConfig {
            identity_file: Some("/keys/lab".to_string()),
            ..Default::default()
        };
        let args = config.base_args("labstation-1");
        assert_eq!(args.last().unwrap(), "root@labstation-1");
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/keys/lab"));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "22"));
    }

    #[tokio::test]
    async fn test_pool_get_put_reuses_connection() {
        let pool = OpenSshPool::new(OpenSshConfig::default());
        let first = pool.get("host-a").await.unwrap();
        pool.put("host-a", first.clone()).await;
        let second = pool.get("host-a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_pool_rejects_empty_host() {
        let pool = OpenSshPool::new(OpenSshConfig::default());
        assert!(pool.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_run_uses_configured_binary() {
        // `echo` stands in for ssh and prints the argument vector.
        let config = OpenSshConfig {
            ssh_bin: "echo".to_string(),
            ..Default::default()
        };
        let conn = OpenSshConnection::new("dut-host", config);
        let result = conn
            .run("status servod PORT=9999", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result
            .stdout
            .trim_end()
            .ends_with("root@dut-host status servod PORT=9999"));
    }
}
