//! Unix socket relay transport
//!
//! The owner listens on a socket path and fans lines out through a
//! broadcast channel. A subscriber that falls behind loses lines instead of
//! stalling the owner; its own reader resynchronizes on the gap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{encode_line, Publisher};
use crate::error::{MonitorError, Result};

/// Lines buffered per subscriber before it starts losing data
pub const RELAY_BUFFER_LINES: usize = 1024;

/// Publishing side of the relay
pub struct UnixRelay {
    path: PathBuf,
    tx: broadcast::Sender<Bytes>,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for UnixRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixRelay")
            .field("path", &self.path)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl UnixRelay {
    /// Bind the relay socket
    ///
    /// A stale socket left by a crashed instance is removed. A socket that
    /// still accepts connections belongs to a running owner.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Relay` if another instance serves the path or
    /// the socket cannot be bound.
    pub async fn bind<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            if UnixStream::connect(&path).await.is_ok() {
                return Err(MonitorError::Relay(format!(
                    "{} is already served by another instance",
                    path.display()
                )));
            }
            warn!("Removing stale relay socket {}", path.display());
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| {
            MonitorError::Relay(format!("Failed to bind {}: {}", path.display(), e))
        })?;

        let (tx, _) = broadcast::channel(RELAY_BUFFER_LINES);
        let accept_task = tokio::spawn(accept_loop(listener, tx.clone()));
        info!("Relay listening on {}", path.display());

        Ok(Self {
            path,
            tx,
            accept_task,
        })
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Publisher for UnixRelay {
    fn publish(&self, key: &str, value: &str) -> Result<()> {
        // Err only means nobody is listening right now
        let _ = self.tx.send(Bytes::from(encode_line(key, value)));
        Ok(())
    }
}

impl Drop for UnixRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed relay socket {}", self.path.display()),
            Err(e) => warn!("Failed to remove relay socket {}: {}", self.path.display(), e),
        }
    }
}

async fn accept_loop(listener: UnixListener, tx: broadcast::Sender<Bytes>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                info!("Subscriber connected ({} total)", tx.receiver_count() + 1);
                tokio::spawn(serve_subscriber(stream, tx.subscribe()));
            }
            Err(e) => {
                warn!("Relay accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_subscriber(mut stream: UnixStream, mut rx: broadcast::Receiver<Bytes>) {
    loop {
        match rx.recv().await {
            Ok(line) => {
                if let Err(e) = stream.write_all(&line).await {
                    debug!("Subscriber disconnected: {}", e);
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Subscriber lagging, dropped {} lines", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Connect to an owner's relay socket
///
/// # Errors
///
/// Returns `MonitorError::Relay` if no owner is listening.
pub async fn subscribe<P: AsRef<Path>>(path: P) -> Result<BufReader<UnixStream>> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).await.map_err(|e| {
        MonitorError::Relay(format!("Failed to connect to {}: {}", path.display(), e))
    })?;
    info!("Subscribed to relay at {}", path.display());
    Ok(BufReader::new(stream))
}
