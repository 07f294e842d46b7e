//! Line-oriented log stream from a running container.

use labperiph_core::{CoreError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::debug;

const LINE_BUFFER: usize = 256;

/// Merged stdout/stderr lines of a `docker logs -f` process.
pub struct LogFollower {
    lines: mpsc::Receiver<String>,
    child: Option<Child>,
}

impl LogFollower {
    /// Take ownership of a spawned follower process with piped stdout/stderr.
    pub fn from_child(mut child: Child) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Io("log follower stdout is not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CoreError::Io("log follower stderr is not piped".to_string()))?;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        spawn_reader(stdout, tx.clone(), "stdout");
        spawn_reader(stderr, tx, "stderr");

        Ok(Self {
            lines: rx,
            child: Some(child),
        })
    }

    /// Follower over a fixed set of lines, used for canned log output.
    pub fn from_lines(lines: Vec<String>) -> Self {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            // capacity covers every line
            let _ = tx.try_send(line);
        }
        Self {
            lines: rx,
            child: None,
        }
    }

    /// Next line, or `None` once both streams reached EOF.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Kill the follower process, if any.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(error) = child.kill().await {
                debug!(error = %error, "Log follower already exited");
            }
        }
        self.lines.close();
    }
}

fn spawn_reader<R>(reader: R, tx: mpsc::Sender<String>, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    debug!(stream, error = %error, "Log pipe read failed");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_from_lines_yields_then_ends() {
        let mut follower = LogFollower::from_lines(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(follower.next_line().await.as_deref(), Some("a"));
        assert_eq!(follower.next_line().await.as_deref(), Some("b"));
        assert_eq!(follower.next_line().await, None);
    }

    #[tokio::test]
    async fn test_from_child_merges_streams() {
        let child = Command::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut follower = LogFollower::from_child(child).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = follower.next_line().await {
            lines.push(line);
        }
        lines.sort();
        assert_eq!(lines, vec!["err".to_string(), "out".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_kills_follower() {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut follower = LogFollower::from_child(child).unwrap();
        follower.stop().await;
        assert_eq!(follower.next_line().await, None);
    }
}
