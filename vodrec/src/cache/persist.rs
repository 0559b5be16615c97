//! Debounced snapshot writer.
//!
//! Every cache mutation nudges a background task. The task waits until no
//! nudge has arrived for the quiet window, then writes one snapshot. A burst
//! of mutations therefore costs a single write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use super::snapshot::{CacheEntry, write_snapshot};
use crate::Result;

/// Handle to the background writer. Dropping the last handle lets the task
/// write any pending snapshot and exit.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    trigger: mpsc::UnboundedSender<()>,
    shared: Arc<WriterShared>,
}

#[derive(Debug)]
struct WriterShared {
    entries: Arc<DashMap<String, CacheEntry>>,
    write_lock: Mutex<()>,
    writes: AtomicU64,
}

impl WriterShared {
    async fn write(&self, path: &Path) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let written = write_snapshot(path, &self.entries).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(written)
    }
}

impl SnapshotWriter {
    /// Spawn the writer task. Must be called from within a Tokio runtime.
    pub fn spawn(
        path: PathBuf,
        entries: Arc<DashMap<String, CacheEntry>>,
        quiet: Duration,
    ) -> Self {
        let (trigger, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WriterShared {
            entries,
            write_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
        });

        tokio::spawn(run_writer(rx, path.clone(), shared.clone(), quiet));

        Self {
            path,
            trigger,
            shared,
        }
    }

    /// Request a snapshot after the quiet window.
    pub fn schedule(&self) {
        // The task only stops once every sender is gone, so this cannot fail
        // while `self` is alive.
        let _ = self.trigger.send(());
    }

    /// Write a snapshot now, bypassing the debounce window.
    pub async fn flush(&self) -> Result<usize> {
        self.shared.write(&self.path).await
    }

    /// Number of snapshots written so far.
    pub fn write_count(&self) -> u64 {
        self.shared.writes.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<()>,
    path: PathBuf,
    shared: Arc<WriterShared>,
    quiet: Duration,
) {
    while rx.recv().await.is_some() {
        let mut closed = false;

        // Each further nudge inside the window restarts it.
        loop {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        match shared.write(&path).await {
            Ok(written) => debug!(path = %path.display(), entries = written, "Persisted cache snapshot"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist cache snapshot"),
        }

        if closed {
            break;
        }
    }
    debug!(path = %path.display(), "Snapshot writer stopped");
}
