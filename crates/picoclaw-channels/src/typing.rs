//! Per-chat typing indicator lifecycle, shared across adapters that
//! support one (Discord, etc).
//!
//! Grounded directly in `discord.rs`'s `typing_tasks: Arc<RwLock<HashMap<String,
//! JoinHandle<()>>>>` plus its `start_typing`/`stop_typing`/`stop_all_typing`
//! methods, generalized behind a small trait so any adapter can plug in its
//! own "send one typing ping" call instead of Discord's REST endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default heartbeat interval between typing pings (matches Discord's
/// `TYPING_INTERVAL_SECS`).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(8);
/// Hard deadline: a typing loop never runs longer than this, even if
/// nothing ever calls `stop`.
pub const MAX_LIFETIME: Duration = Duration::from_secs(3 * 60);

/// The platform-specific half of the loop: one ping per tick.
#[async_trait]
pub trait TypingSink: Send + Sync + 'static {
    async fn ping(&self, chat_id: &str);
}

/// Per-chat typing indicator, reference-counted at the loop level:
/// calling `start` again while a loop is active just restarts it rather
/// than stacking a second task (mirrors `start_typing` calling
/// `stop_typing` first in the teacher).
pub struct TypingIndicator<S: TypingSink> {
    sink: Arc<S>,
    interval: Duration,
    max_lifetime: Duration,
    tasks: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    shutdown: Arc<Notify>,
}

impl<S: TypingSink> TypingIndicator<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self::with_timing(sink, DEFAULT_INTERVAL, MAX_LIFETIME)
    }

    pub fn with_timing(sink: Arc<S>, interval: Duration, max_lifetime: Duration) -> Self {
        Self {
            sink,
            interval,
            max_lifetime,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Launch (or restart) the typing loop for `chat_id`. Pings
    /// immediately, then every `interval`, until `stop` is called, the
    /// indicator is dropped via `stop_all`, or `max_lifetime` elapses.
    pub async fn start(&self, chat_id: &str) {
        self.stop(chat_id).await;

        let sink = self.sink.clone();
        let interval = self.interval;
        let max_lifetime = self.max_lifetime;
        let shutdown = self.shutdown.clone();
        let chat_id_owned = chat_id.to_string();

        let handle = tokio::spawn(async move {
            let deadline = tokio::time::sleep(max_lifetime);
            tokio::pin!(deadline);

            loop {
                sink.ping(&chat_id_owned).await;

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.notified() => break,
                    _ = &mut deadline => {
                        debug!(chat_id = %chat_id_owned, "typing indicator hit max lifetime");
                        break;
                    }
                }
            }
            debug!(chat_id = %chat_id_owned, "typing indicator stopped");
        });

        self.tasks.write().await.insert(chat_id.to_string(), handle);
    }

    /// Cancel the typing loop for `chat_id` unconditionally — the
    /// implementer MUST NOT wait for pending references to reach zero;
    /// every outbound send calls this once regardless of who else might
    /// still think typing is active.
    pub async fn stop(&self, chat_id: &str) {
        let mut tasks = self.tasks.write().await;
        if let Some(handle) = tasks.remove(chat_id) {
            handle.abort();
        }
    }

    /// Cancel every active typing loop (called from the adapter's `Stop`).
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.write().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        pings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TypingSink for CountingSink {
        async fn ping(&self, _chat_id: &str) {
            self.pings.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_start_then_stop_removes_task() {
        let pings = Arc::new(AtomicUsize::new(0));
        let indicator = TypingIndicator::with_timing(
            Arc::new(CountingSink { pings: pings.clone() }),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );

        indicator.start("chat-1").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(indicator.active_count().await, 1);

        indicator.stop("chat-1").await;
        assert_eq!(indicator.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_all_clears_every_task() {
        let pings = Arc::new(AtomicUsize::new(0));
        let indicator = TypingIndicator::with_timing(
            Arc::new(CountingSink { pings: pings.clone() }),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );

        indicator.start("chat-1").await;
        indicator.start("chat-2").await;
        assert_eq!(indicator.active_count().await, 2);

        indicator.stop_all().await;
        assert_eq!(indicator.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_restart_does_not_stack_tasks() {
        let pings = Arc::new(AtomicUsize::new(0));
        let indicator = TypingIndicator::with_timing(
            Arc::new(CountingSink { pings: pings.clone() }),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );

        indicator.start("chat-1").await;
        indicator.start("chat-1").await;
        assert_eq!(indicator.active_count().await, 1);
        indicator.stop("chat-1").await;
    }

    #[tokio::test]
    async fn test_max_lifetime_ends_loop_without_explicit_stop() {
        let pings = Arc::new(AtomicUsize::new(0));
        let indicator = TypingIndicator::with_timing(
            Arc::new(CountingSink { pings: pings.clone() }),
            Duration::from_millis(5),
            Duration::from_millis(20),
        );

        indicator.start("chat-1").await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(pings.load(Ordering::SeqCst) >= 2);
    }
}
