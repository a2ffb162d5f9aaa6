use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::frame::ChannelEvent;
use super::handle::HandleId;
use super::registry::ChannelRegistry;
use crate::metrics::Metrics;

/// Result of fanning one event out to one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Handles that accepted the frame.
    pub delivered: usize,
    /// Dead handles removed from the registry during this broadcast.
    pub pruned: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("failed to encode payload for '{event_type}' on channel '{channel}': {source}")]
    Encode {
        channel: String,
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Pushes framed events to every live handle of a channel.
///
/// Dead handles are detected two ways: a closed connection is skipped without a
/// write, and a failed write marks the handle dead after the attempt. Both are
/// removed by identity once the pass over the snapshot is complete.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ChannelRegistry,
    metrics: Metrics,
}

impl Broadcaster {
    pub fn new(registry: ChannelRegistry, metrics: Metrics) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        event_type: &str,
        payload: &T,
    ) -> Result<BroadcastOutcome, BroadcastError> {
        let payload = serde_json::to_value(payload).map_err(|source| BroadcastError::Encode {
            channel: channel.to_string(),
            event_type: event_type.to_string(),
            source,
        })?;
        let event = ChannelEvent::new(channel, event_type, payload);
        let frame = event.to_frame();

        let handles = self.registry.handles(channel);
        let mut dead: Vec<HandleId> = Vec::new();
        let mut delivered = 0;
        for handle in &handles {
            if handle.is_closed() {
                dead.push(handle.id());
                continue;
            }
            match handle.write(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(channel, handle = %handle.id(), error = %e, "sse write failed");
                    dead.push(handle.id());
                }
            }
        }

        // Handles already removed by a concurrent sweep or unsubscribe are skipped here
        let pruned = self.registry.remove_handles(channel, &dead);

        self.metrics.inc_broadcasts();
        self.metrics.add_events_delivered(delivered as u64);
        self.metrics.add_handles_pruned(pruned as u64);
        if pruned > 0 {
            tracing::info!(channel, pruned, "Removed dead SSE connections");
        }
        tracing::debug!(channel, event_type, delivered, timestamp = %event.timestamp, "broadcast");

        Ok(BroadcastOutcome { delivered, pruned })
    }

    /// Broadcasts to each channel independently. A failure on one channel is
    /// logged and does not affect the others.
    pub fn broadcast_many<C, T>(&self, channels: &[C], event_type: &str, payload: &T) -> Vec<BroadcastOutcome>
    where
        C: AsRef<str>,
        T: Serialize + ?Sized,
    {
        let mut outcomes = Vec::with_capacity(channels.len());
        for channel in channels {
            let channel = channel.as_ref();
            match self.broadcast(channel, event_type, payload) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(channel, event_type, "Broadcast failed: {}", e);
                    outcomes.push(BroadcastOutcome::default());
                }
            }
        }
        outcomes
    }

    /// Removes handles whose connection closed without a broadcast noticing.
    pub fn sweep(&self) -> usize {
        let removed = self.registry.sweep();
        self.metrics.add_handles_swept(removed as u64);
        if removed > 0 {
            tracing::info!(removed, remaining = self.registry.count_total(), "SSE sweep removed dead connections");
        }
        removed
    }

    /// Runs [`Broadcaster::sweep`] every `period` until `cancel` fires.
    pub fn spawn_sweeper(&self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("SSE sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        this.sweep();
                    }
                }
            }
        })
    }
}
