//! Async message bus — the central nervous system of Picoclaw.
//!
//! Replaces nanobot's `bus/queue.py` (asyncio.Queue-based MessageBus).
//! Uses tokio::sync::mpsc bounded channels.

use super::types::{InboundMessage, OutboundMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Error returned when publishing to a closed or abandoned bus.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("message bus is closed")]
    Closed,
    #[error("receiver dropped")]
    ReceiverDropped,
}

/// The message bus connecting channels ↔ agent loop.
///
/// - Channels publish to `inbound` (user messages arriving)
/// - Agent loop consumes from `inbound`, processes, publishes to `outbound`
/// - Channel manager consumes from `outbound` and routes to correct channel
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<OutboundMessage>>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl MessageBus {
    /// Create a new message bus with the given buffer capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        MessageBus {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Idempotently close the bus, unblocking any pending `publish_*`/`consume_*`
    /// calls. Safe to call from multiple tasks and multiple times.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_signal.notify_waiters();
        }
    }

    /// Publish a message from a channel to the agent (inbound).
    ///
    /// Races against `close()` so a publisher blocked on a full queue during
    /// shutdown does not hang forever.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }
        tokio::select! {
            res = self.inbound_tx.send(msg) => res.map_err(|_| PublishError::ReceiverDropped),
            _ = self.close_signal.notified() => Err(PublishError::Closed),
        }
    }

    /// Consume the next inbound message, or `None` once the bus is closed and
    /// drained (or all senders are dropped).
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            msg = rx.recv() => msg,
            _ = self.close_signal.notified() => None,
        }
    }

    /// Publish a response from the agent to a channel (outbound).
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }
        tokio::select! {
            res = self.outbound_tx.send(msg) => res.map_err(|_| PublishError::ReceiverDropped),
            _ = self.close_signal.notified() => Err(PublishError::Closed),
        }
    }

    /// Consume the next outbound message, or `None` once the bus is closed and
    /// drained (or all senders are dropped).
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        let mut rx = self.outbound_rx.lock().await;
        tokio::select! {
            msg = rx.recv() => msg,
            _ = self.close_signal.notified() => None,
        }
    }

    /// Get a clone of the inbound sender (for channels to use).
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }

    /// Get a clone of the outbound sender (for the agent loop to use).
    pub fn outbound_sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.outbound_tx.clone()
    }
}

/// Convenience for constructing a shared bus handle.
pub fn shared(buffer_size: usize) -> Arc<MessageBus> {
    Arc::new(MessageBus::new(buffer_size))
}


