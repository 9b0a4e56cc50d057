use anyhow::{Context, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Delete a workspace subtree. An already missing directory counts as done.
///
/// Returns `true` when something was removed.
pub async fn remove_workspace(path: &Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).context(format!("failed to delete folder {:?}", path)),
    }
}

async fn reap(path: &Path) {
    match remove_workspace(path).await {
        Ok(true) => info!("Deleted folder: {:?}", path),
        Ok(false) => info!("Folder already gone: {:?}", path),
        Err(err) => error!("Error deleting folder: {:?}: {:#}", path, err),
    }
}

/// Owns deferred workspace deletion.
///
/// Each workspace gets at most one pending deletion. On shutdown the pending
/// timers are cut short and their workspaces deleted right away.
#[derive(Clone)]
pub struct Reaper {
    inner: Arc<ReaperInner>,
}

struct ReaperInner {
    grace: Duration,
    pending: DashMap<PathBuf, JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl Reaper {
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(ReaperInner {
                grace,
                pending: DashMap::new(),
                shutdown_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    /// Delete `path` once the grace delay has passed.
    ///
    /// Must be called from within a Tokio runtime. Returns `false` when a
    /// deletion for this path is already pending.
    pub fn schedule(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        match self.inner.pending.entry(path.clone()) {
            Entry::Occupied(_) => {
                warn!("Cleanup for {:?} is already scheduled", path);
                false
            }
            Entry::Vacant(vacant) => {
                let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
                let closed = self.inner.closed.load(Ordering::SeqCst);
                let grace = self.inner.grace;
                let inner = Arc::clone(&self.inner);
                let task_path = path.clone();

                let handle = tokio::spawn(async move {
                    if !closed {
                        tokio::select! {
                            _ = tokio::time::sleep(grace) => {}
                            _ = shutdown_rx.recv() => {
                                info!("Shutting down, deleting {:?} early", task_path);
                            }
                        }
                    }
                    reap(&task_path).await;
                    inner.pending.remove(&task_path);
                });
                vacant.insert(handle);
                true
            }
        }
    }

    /// Schedule from a synchronous context such as `Drop`.
    ///
    /// Without a runtime the workspace is deleted on the spot.
    pub fn schedule_from_sync(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        if tokio::runtime::Handle::try_current().is_ok() {
            self.schedule(path);
            return;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!("Deleted folder: {:?}", path),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => error!("Error deleting folder: {:?}: {}", path, err),
        }
    }

    /// Cut every pending grace delay short and wait for the deletions.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(());

        let paths: Vec<PathBuf> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        info!("Reaping {} pending workspaces before exit", paths.len());

        for path in paths {
            if let Some((_, handle)) = self.inner.pending.remove(&path) {
                if let Err(err) = handle.await {
                    error!("Cleanup task for {:?} failed: {}", path, err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn populated_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("a.webp"), b"x").unwrap();
        std::fs::write(dir.join("inner").join("b.txt"), b"y").unwrap();
        dir
    }

    async fn wait_until_gone(path: &Path, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        !path.exists()
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = populated_dir(root.path(), "ws");

        assert!(remove_workspace(&dir).await.unwrap());
        assert!(!dir.exists());
        assert!(!remove_workspace(&dir).await.unwrap());
    }

    #[tokio::test]
    async fn deletes_after_grace_delay() {
        let root = tempfile::tempdir().unwrap();
        let dir = populated_dir(root.path(), "ws");
        let reaper = Reaper::new(Duration::from_millis(200));

        assert!(reaper.schedule(&dir));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dir.exists(), "deleted before the grace delay elapsed");

        assert!(wait_until_gone(&dir, Duration::from_secs(5)).await);
        // the pending entry is released shortly after deletion
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reaper.pending(), 0);
    }

    #[tokio::test]
    async fn second_schedule_for_same_path_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let dir = populated_dir(root.path(), "ws");
        let reaper = Reaper::new(Duration::from_secs(60));

        assert!(reaper.schedule(&dir));
        assert!(!reaper.schedule(&dir));
        assert_eq!(reaper.pending(), 1);

        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_reaps_pending_workspaces_early() {
        let root = tempfile::tempdir().unwrap();
        let first = populated_dir(root.path(), "one");
        let second = populated_dir(root.path(), "two");
        let reaper = Reaper::new(Duration::from_secs(3600));
        reaper.schedule(&first);
        reaper.schedule(&second);

        reaper.shutdown().await;

        assert!(!first.exists());
        assert!(!second.exists());
        assert_eq!(reaper.pending(), 0);
    }

    #[tokio::test]
    async fn schedule_after_shutdown_deletes_without_waiting() {
        let root = tempfile::tempdir().unwrap();
        let dir = populated_dir(root.path(), "late");
        let reaper = Reaper::new(Duration::from_secs(3600));
        reaper.shutdown().await;

        reaper.schedule(&dir);

        assert!(wait_until_gone(&dir, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn missing_workspace_does_not_crash_the_timer() {
        let root = tempfile::tempdir().unwrap();
        let reaper = Reaper::new(Duration::from_millis(10));

        reaper.schedule(root.path().join("never-created"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(reaper.pending(), 0);
    }

    #[test]
    fn sync_schedule_without_runtime_deletes_immediately() {
        let root = tempfile::tempdir().unwrap();
        let dir = populated_dir(root.path(), "ws");
        let reaper = Reaper::new(Duration::from_secs(3600));

        reaper.schedule_from_sync(&dir);

        assert!(!dir.exists());
    }
}
