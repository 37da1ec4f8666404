//! Append-only JSONL audit sink.
//!
//! Grounded in `crate::heartbeat::HeartbeatService`'s shutdown/task idiom:
//! one long-running `tokio::spawn`ed task, a `tokio::select!` over work vs.
//! an `Arc<Notify>` shutdown signal. Unlike the bus, the hot-path write is
//! synchronous and non-blocking — callers push onto a bounded in-memory
//! queue guarded by a `Mutex`, and the writer task drains it on its own
//! schedule, dropping the oldest pending entry on overflow rather than
//! blocking the turn that's trying to record it.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, warn};

use super::types::AuditEntry;

/// Bounded queue + single writer task appending one JSON line per entry to
/// `<workspace>/hooks/hook-events.jsonl`.
pub struct AuditSink {
    queue: Arc<Mutex<VecDeque<AuditEntry>>>,
    capacity: usize,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
    dropped: Arc<std::sync::atomic::AtomicU64>,
}

impl AuditSink {
    /// Construct a sink rooted at `workspace`. Does not spawn the writer
    /// task — call [`AuditSink::start`] once the bus/pool are also running.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            dropped: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    /// Non-blocking enqueue from the hot path. Drops the oldest pending
    /// entry if the queue is already at capacity.
    pub async fn enqueue(&self, entry: AuditEntry) {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        queue.push_back(entry);
        drop(queue);
        self.wake.notify_one();
    }

    /// Number of entries dropped due to overflow since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Number of entries currently queued, awaiting the writer task.
    pub async fn pending_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Signal the writer task to stop after draining whatever is queued.
    pub fn signal_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Spawn the single writer task. The returned handle resolves once
    /// `signal_shutdown()` has been called and the final drain completes.
    pub fn start(&self, audit_path: PathBuf) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let wake = self.wake.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Some(parent) = audit_path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(error = %e, path = %parent.display(), "failed to create hooks directory");
                }
            }

            loop {
                tokio::select! {
                    _ = wake.notified() => {}
                    _ = shutdown.notified() => {
                        drain(&queue, &audit_path).await;
                        break;
                    }
                }
                drain(&queue, &audit_path).await;
            }
            debug!("audit sink writer stopped");
        })
    }
}

async fn drain(queue: &Arc<Mutex<VecDeque<AuditEntry>>>, path: &PathBuf) {
    let entries: Vec<AuditEntry> = {
        let mut q = queue.lock().await;
        q.drain(..).collect()
    };
    if entries.is_empty() {
        return;
    }

    use tokio::io::AsyncWriteExt;
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await;

    let mut file = match file {
        Ok(f) => f,
        Err(e) => {
            // Transient open failure: drop this batch, keep the writer alive
            // for the next one rather than blocking or panicking.
            error!(error = %e, path = %path.display(), "failed to open audit log, dropping batch");
            return;
        }
    };

    for entry in entries {
        match serde_json::to_string(&entry) {
            Ok(line) => {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    error!(error = %e, "audit log write failed");
                    continue;
                }
                let _ = file.write_all(b"\n").await;
            }
            Err(e) => error!(error = %e, "failed to serialize audit entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::types::{Event, HookContext, HookResult};
    use tempfile::tempdir;

    fn entry(turn: &str) -> AuditEntry {
        let ctx = HookContext::new(turn, "discord:1@abc");
        let result = HookResult::ok("done");
        AuditEntry::new(Event::BeforeTurn, "policy", &ctx, &result)
    }

    #[tokio::test]
    async fn test_enqueue_and_drain_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hooks").join("hook-events.jsonl");
        let sink = AuditSink::new(256);
        let handle = sink.start(path.clone());

        sink.enqueue(entry("t1")).await;
        sink.enqueue(entry("t2")).await;
        sink.signal_shutdown();
        handle.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"turn_id\":\"t1\""));
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_pending() {
        let sink = AuditSink::new(3);
        sink.enqueue(entry("a")).await;
        sink.enqueue(entry("b")).await;
        sink.enqueue(entry("c")).await;
        sink.enqueue(entry("d")).await;

        let queue = sink.queue.lock().await;
        assert_eq!(queue.len(), 3);
        assert_eq!(queue[0].context.turn_id, "b");
        assert_eq!(queue[2].context.turn_id, "d");
        assert_eq!(sink.dropped_count(), 1);
    }
}
