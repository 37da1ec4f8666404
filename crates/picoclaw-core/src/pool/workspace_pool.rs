//! Per-workspace agent-worker pool.
//!
//! Grounded in `picoclaw-channels::manager::ChannelManager`'s task-spawn
//! pattern (`tokio::spawn` per unit of concurrency, `tokio::select!`
//! shutdown idiom) — generalized from "one task per channel" to "one task
//! per workspace, keyed by canonicalized path."

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, warn};

use crate::bus::types::InboundMessage;

/// Per-workspace queue depth. Spec floor is 64; the default matches the
/// teacher's bus capacity for consistency across backpressure points.
pub const DEFAULT_WORKSPACE_QUEUE_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("agent-loop pool is closed")]
    Closed,
    #[error("failed to construct agent worker for workspace {workspace}: {source}")]
    WorkerConstruction { workspace: String, source: String },
    #[error("workspace worker channel closed")]
    WorkerGone,
}

/// Implemented by whatever can process one turn. `picoclaw-core` cannot
/// depend on `picoclaw-agent` (the reverse dependency already exists), so
/// the pool is generic over this trait; `picoclaw-cli` provides the
/// concrete `AgentLoop`-backed implementation since it depends on both.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    /// Process one inbound turn to completion, including publishing any
    /// resulting `OutboundMessage`(s) onto the bus. Errors are logged by
    /// the worker loop; they do not crash the workspace worker.
    async fn handle_inbound(&self, msg: InboundMessage) -> anyhow::Result<()>;
}

/// Builds a [`TurnHandler`] for a given workspace by cloning the global
/// config and overriding `agents.defaults.workspace`, per §4.4.
#[async_trait]
pub trait TurnHandlerFactory: Send + Sync {
    async fn build(&self, workspace: &Path) -> anyhow::Result<Arc<dyn TurnHandler>>;
}

struct WorkspaceWorker {
    tx: mpsc::Sender<InboundMessage>,
    handle: tokio::task::JoinHandle<()>,
}

/// Keyed by canonicalized workspace path. On first dispatch for a
/// workspace, constructs a worker via the factory and spawns a task that
/// serializes turns for that workspace; concurrent workspaces run fully in
/// parallel.
pub struct AgentLoopPool {
    workers: Mutex<HashMap<String, WorkspaceWorker>>,
    factory: Arc<dyn TurnHandlerFactory>,
    queue_size: usize,
    closed: std::sync::atomic::AtomicBool,
    shutdown: Arc<Notify>,
}

impl AgentLoopPool {
    pub fn new(factory: Arc<dyn TurnHandlerFactory>) -> Self {
        Self::with_queue_size(factory, DEFAULT_WORKSPACE_QUEUE_SIZE)
    }

    pub fn with_queue_size(factory: Arc<dyn TurnHandlerFactory>, queue_size: usize) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            factory,
            queue_size: queue_size.max(DEFAULT_WORKSPACE_QUEUE_SIZE),
            closed: std::sync::atomic::AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn canonical_key(workspace: &str) -> String {
        std::fs::canonicalize(workspace)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| workspace.to_string())
    }

    /// Dispatch `msg` to the worker for `workspace`, constructing the
    /// worker lazily on first use. Serializes turns within a workspace;
    /// concurrent workspaces proceed independently.
    pub async fn dispatch(&self, workspace: &str, msg: InboundMessage) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let key = Self::canonical_key(workspace);
        let tx = {
            let mut workers = self.workers.lock().await;
            if let Some(worker) = workers.get(&key) {
                worker.tx.clone()
            } else {
                let worker = self.spawn_worker(workspace).await?;
                let tx = worker.tx.clone();
                workers.insert(key.clone(), worker);
                tx
            }
        };

        tokio::select! {
            res = tx.send(msg) => res.map_err(|_| PoolError::WorkerGone),
            _ = self.shutdown.notified() => Err(PoolError::Closed),
        }
    }

    async fn spawn_worker(&self, workspace: &str) -> Result<WorkspaceWorker, PoolError> {
        let handler = self
            .factory
            .build(Path::new(workspace))
            .await
            .map_err(|e| PoolError::WorkerConstruction {
                workspace: workspace.to_string(),
                source: e.to_string(),
            })?;

        let (tx, mut rx) = mpsc::channel::<InboundMessage>(self.queue_size);
        let shutdown = self.shutdown.clone();
        let workspace_owned = workspace.to_string();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = handler.handle_inbound(msg).await {
                            error!(workspace = %workspace_owned, error = %e, "turn handler failed");
                        }
                    }
                    _ = shutdown.notified() => {
                        // Drain whatever is already queued before exiting so
                        // in-flight turns finish (§4.4 lifecycle contract).
                        rx.close();
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = handler.handle_inbound(msg).await {
                                error!(workspace = %workspace_owned, error = %e, "turn handler failed during drain");
                            }
                        }
                        break;
                    }
                }
            }
            debug!(workspace = %workspace_owned, "workspace worker exited");
        });

        Ok(WorkspaceWorker { tx, handle })
    }

    /// Idempotently close the pool: cancel every worker's receive loop and
    /// wait for each to finish its in-flight turn and exit.
    pub async fn close(&self) {
        if self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_waiters();

        let mut workers = self.workers.lock().await;
        for (key, worker) in workers.drain() {
            if let Err(e) = worker.handle.await {
                warn!(workspace = %key, error = %e, "workspace worker task panicked");
            }
        }
    }

    /// Number of workspaces with an active worker. Test/diagnostic only.
    pub async fn active_workspace_count(&self) -> usize {
        self.workers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TurnHandler for CountingHandler {
        async fn handle_inbound(&self, _msg: InboundMessage) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingFactory {
        calls: Arc<AtomicUsize>,
        built: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TurnHandlerFactory for CountingFactory {
        async fn build(&self, _workspace: &Path) -> anyhow::Result<Arc<dyn TurnHandler>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingHandler {
                calls: self.calls.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_dispatch_builds_worker_lazily_once_per_workspace() {
        let dir = tempdir().unwrap();
        let ws = dir.path().to_str().unwrap().to_string();
        let calls = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(AtomicUsize::new(0));
        let pool = AgentLoopPool::new(Arc::new(CountingFactory {
            calls: calls.clone(),
            built: built.clone(),
        }));

        pool.dispatch(&ws, InboundMessage::new("discord", "u1", "42", "hi"))
            .await
            .unwrap();
        pool.dispatch(&ws, InboundMessage::new("discord", "u1", "42", "again"))
            .await
            .unwrap();

        // Give the worker task a tick to drain.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.active_workspace_count().await, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_dispatch_after_close_errors() {
        let dir = tempdir().unwrap();
        let ws = dir.path().to_str().unwrap().to_string();
        let calls = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(AtomicUsize::new(0));
        let pool = AgentLoopPool::new(Arc::new(CountingFactory { calls, built }));

        pool.close().await;
        let err = pool
            .dispatch(&ws, InboundMessage::new("discord", "u1", "42", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Closed));
    }

    #[tokio::test]
    async fn test_concurrent_workspaces_get_independent_workers() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(AtomicUsize::new(0));
        let pool = AgentLoopPool::new(Arc::new(CountingFactory {
            calls: calls.clone(),
            built: built.clone(),
        }));

        pool.dispatch(
            dir_a.path().to_str().unwrap(),
            InboundMessage::new("discord", "u1", "1", "hi"),
        )
        .await
        .unwrap();
        pool.dispatch(
            dir_b.path().to_str().unwrap(),
            InboundMessage::new("discord", "u1", "2", "hi"),
        )
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.active_workspace_count().await, 2);

        pool.close().await;
    }
}
