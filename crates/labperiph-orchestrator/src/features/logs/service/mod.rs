use crate::error::{OrchestratorError, Result};
use labperiph_core::CoreError;
use labperiph_runtime::LogFollower;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Target container log lines are echoed under.
pub const CONTAINER_LOG_TARGET: &str = "container:logs";

type Stream = (CancellationToken, JoinHandle<()>);

/// Fans container log followers out to one streaming task each and joins
/// them all on close.
///
/// Followers are handed over through a capacity-1 dispatch channel drained by
/// a single reader task. Each streaming task appends to `<log_dir>/<name>.log`
/// and echoes lines to tracing.
pub struct LogFanout {
    log_dir: PathBuf,
    dispatch: Mutex<Option<mpsc::Sender<(String, LogFollower)>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    streams: Arc<Mutex<Vec<Stream>>>,
}

impl LogFanout {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        let (tx, rx) = mpsc::channel(1);
        let streams = Arc::new(Mutex::new(Vec::new()));
        let reader = tokio::spawn(read_dispatch(rx, log_dir.clone(), streams.clone()));

        Self {
            log_dir,
            dispatch: Mutex::new(Some(tx)),
            reader: Mutex::new(Some(reader)),
            streams,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path the lines of `name` are written to.
    pub fn log_path(&self, name: &str) -> Result<PathBuf> {
        log_path(&self.log_dir, name)
    }

    /// Hand a follower over for streaming.
    pub async fn push(&self, name: &str, follower: LogFollower) -> Result<()> {
        log_path(&self.log_dir, name)?;
        let sender = self
            .dispatch
            .lock()
            .await
            .clone()
            .ok_or(OrchestratorError::LogsClosed)?;
        sender
            .send((name.to_string(), follower))
            .await
            .map_err(|_| OrchestratorError::LogsClosed)
    }

    /// Lines written for `name` so far.
    pub async fn read(&self, name: &str) -> Result<Vec<String>> {
        let path = log_path(&self.log_dir, name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(
                CoreError::NotRunning(format!("no logs recorded for {name}")).into(),
            ),
            Err(error) => Err(error.into()),
        }
    }

    /// Stop accepting followers, signal every streaming task and wait for all
    /// of them. A second call fails with `LogsClosed`.
    pub async fn close(&self) -> Result<()> {
        let sender = self
            .dispatch
            .lock()
            .await
            .take()
            .ok_or(OrchestratorError::LogsClosed)?;
        drop(sender);

        if let Some(reader) = self.reader.lock().await.take() {
            if let Err(error) = reader.await {
                warn!(error = %error, "Log dispatch reader failed");
            }
        }

        let streams = std::mem::take(&mut *self.streams.lock().await);
        for (done, _) in &streams {
            done.cancel();
        }
        let count = streams.len();
        for (_, handle) in streams {
            if let Err(error) = handle.await {
                warn!(error = %error, "Log streaming task failed");
            }
        }

        info!(streams = count, "Log streaming closed");
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.dispatch.lock().await.is_none()
    }
}

fn log_path(log_dir: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(OrchestratorError::InvalidCommand(format!(
            "invalid log stream name {name:?}"
        )));
    }
    Ok(log_dir.join(format!("{name}.log")))
}

async fn read_dispatch(
    mut rx: mpsc::Receiver<(String, LogFollower)>,
    log_dir: PathBuf,
    streams: Arc<Mutex<Vec<Stream>>>,
) {
    while let Some((name, follower)) = rx.recv().await {
        let done = CancellationToken::new();
        let handle = tokio::spawn(stream_logs(
            name.clone(),
            follower,
            log_dir.clone(),
            done.clone(),
        ));
        streams.lock().await.push((done, handle));
        debug!(container = %name, "Started log stream");
    }
}

async fn open_log(log_dir: &Path, name: &str) -> std::io::Result<File> {
    tokio::fs::create_dir_all(log_dir).await?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(format!("{name}.log")))
        .await
}

async fn stream_logs(
    name: String,
    mut follower: LogFollower,
    log_dir: PathBuf,
    done: CancellationToken,
) {
    let mut file = match open_log(&log_dir, &name).await {
        Ok(file) => Some(file),
        Err(error) => {
            warn!(container = %name, error = %error, "Cannot open log file, echoing only");
            None
        }
    };

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            line = follower.next_line() => {
                let Some(line) = line else { break };
                info!(target: CONTAINER_LOG_TARGET, container = %name, "{line}");
                if let Some(out) = file.as_mut() {
                    let written = async {
                        out.write_all(line.as_bytes()).await?;
                        out.write_all(b"\n").await
                    }
                    .await;
                    if let Err(error) = written {
                        warn!(container = %name, error = %error, "Log write failed");
                        file = None;
                    }
                }
            }
        }
    }

    follower.stop().await;
    if let Some(mut out) = file {
        if let Err(error) = out.flush().await {
            debug!(container = %name, error = %error, "Log flush failed");
        }
    }
}
