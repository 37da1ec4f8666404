//! Channel Manager — orchestrates channel lifecycle and message routing.
//!
//! Port of nanobot's `channels/manager.py`.
//!
//! Responsibilities:
//! - Register enabled channels
//! - Start/stop all channels concurrently via `tokio::spawn`
//! - Dispatch outbound messages from the bus to the correct channel
//! - Report channel status

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use picoclaw_core::bus::queue::MessageBus;

use crate::base::Channel;

// ─────────────────────────────────────────────
// ChannelManager
// ─────────────────────────────────────────────

/// Manages the lifecycle and message routing for all chat channels.
///
/// Channels are registered with `register()`, started concurrently with
/// `start_all()`, and stopped with `stop_all()`. An outbound dispatcher
/// task reads from the message bus and routes responses to the correct
/// channel.
pub struct ChannelManager {
    /// Registered channels, keyed by name.
    channels: HashMap<String, Arc<dyn Channel>>,
    /// Message bus for outbound message consumption.
    bus: Arc<MessageBus>,
    /// Shutdown signal.
    shutdown: Arc<Notify>,
}

impl ChannelManager {
    /// Create a new channel manager.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: HashMap::new(),
            bus,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register a channel. Overwrites any previous channel with the same name.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered channel");
        self.channels.insert(name, channel);
    }

    /// Unregister a channel by name.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Channel>> {
        let removed = self.channels.remove(name);
        if removed.is_some() {
            info!(channel = %name, "unregistered channel");
        }
        removed
    }

    /// Get a registered channel by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// Get the names of all registered channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether there are no registered channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start all channels + the outbound dispatcher.
    ///
    /// Each channel's `start()` is spawned as a `tokio::spawn` task.
    /// The outbound dispatcher runs as an additional task that routes
    /// messages from the bus to the correct channel.
    ///
    /// This method blocks until shutdown is signaled.
    pub async fn start_all(&self) -> Result<()> {
        if self.channels.is_empty() {
            warn!("no channels registered, nothing to start");
            return Ok(());
        }

        info!(
            channels = ?self.channel_names(),
            "starting {} channel(s)",
            self.channels.len()
        );

        let mut handles = Vec::new();

        // Spawn each channel's start() as a background task
        for (name, channel) in &self.channels {
            let ch = channel.clone();
            let ch_name = name.clone();

            let handle = tokio::spawn(async move {
                info!(channel = %ch_name, "channel starting");
                if let Err(e) = ch.start().await {
                    error!(channel = %ch_name, error = %e, "channel start failed");
                }
                info!(channel = %ch_name, "channel stopped");
            });

            handles.push(handle);
        }

        // Spawn the outbound dispatcher
        let bus = self.bus.clone();
        let channels = self.channels.clone();
        let shutdown = self.shutdown.clone();

        let dispatcher_handle = tokio::spawn(async move {
            Self::dispatch_outbound(bus, channels, shutdown).await;
        });

        handles.push(dispatcher_handle);

        // Wait for shutdown signal
        self.shutdown.notified().await;

        info!("channel manager shutting down");
        Ok(())
    }

    /// Stop all channels and the outbound dispatcher.
    pub async fn stop_all(&self) {
        info!("stopping all channels");

        // Signal shutdown to the dispatcher
        self.shutdown.notify_waiters();

        // Stop each channel
        for (name, channel) in &self.channels {
            debug!(channel = %name, "stopping channel");
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "channel stop failed");
            }
        }

        info!("all channels stopped");
    }

    /// Signal the manager to shut down.
    pub fn signal_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Outbound message dispatcher — routes agent responses to the correct channel.
    ///
    /// Runs as a background task, polling the bus outbound queue.
    async fn dispatch_outbound(
        bus: Arc<MessageBus>,
        channels: HashMap<String, Arc<dyn Channel>>,
        shutdown: Arc<Notify>,
    ) {
        info!("outbound dispatcher started");

        loop {
            tokio::select! {
                msg = bus.consume_outbound() => {
                    match msg {
                        Some(outbound) => {
                            debug!(
                                channel = %outbound.channel,
                                chat_id = %outbound.chat_id,
                                content_len = outbound.content.len(),
                                "dispatching outbound message"
                            );

                            if let Some(channel) = channels.get(&outbound.channel) {
                                if let Err(e) = channel.send(&outbound).await {
                                    error!(
                                        channel = %outbound.channel,
                                        error = %e,
                                        "failed to send outbound message"
                                    );
                                }
                            } else {
                                warn!(
                                    channel = %outbound.channel,
                                    "no channel registered for outbound message"
                                );
                            }
                        }
                        None => {
                            info!("outbound bus closed, dispatcher exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("dispatcher received shutdown signal");
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────


