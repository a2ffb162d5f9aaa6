use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::handle::{HandleId, StreamHandle};

/// Channel name -> ordered handles of connected subscribers.
///
/// Every method is a short critical section under a synchronous lock and never
/// calls into a sink, so the lock is never held across a write or an `.await`.
/// Channels with no handles are removed eagerly.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<HashMap<String, Vec<StreamHandle>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<StreamHandle>>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<StreamHandle>>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends `handle` to `channel`, creating the channel if needed.
    /// The same handle may be added twice; callers keep handles unique.
    pub fn subscribe(&self, channel: &str, handle: StreamHandle) {
        let mut channels = self.write();
        channels.entry(channel.to_string()).or_default().push(handle);
        tracing::debug!(channel, total = channels.get(channel).map_or(0, Vec::len), "sse subscribe");
    }

    /// Removes the first handle with identity `id`. Missing handles are a no-op.
    /// Returns whether a handle was removed.
    pub fn unsubscribe(&self, channel: &str, id: HandleId) -> bool {
        let mut channels = self.write();
        let Some(handles) = channels.get_mut(channel) else {
            return false;
        };
        let removed = match handles.iter().position(|h| h.id() == id) {
            Some(idx) => {
                handles.remove(idx);
                true
            }
            None => false,
        };
        if handles.is_empty() {
            channels.remove(channel);
        }
        if removed {
            tracing::debug!(channel, handle = %id, "sse unsubscribe");
        }
        removed
    }

    /// Removes every handle whose identity is in `ids`. Returns how many were removed.
    pub fn remove_handles(&self, channel: &str, ids: &[HandleId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut channels = self.write();
        let Some(handles) = channels.get_mut(channel) else {
            return 0;
        };
        let before = handles.len();
        handles.retain(|h| !ids.contains(&h.id()));
        let removed = before - handles.len();
        if handles.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Snapshot of the handles currently registered on `channel`.
    pub fn handles(&self, channel: &str) -> Vec<StreamHandle> {
        self.read().get(channel).cloned().unwrap_or_default()
    }

    /// Names of all non-empty channels, sorted.
    pub fn list_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count_in_channel(&self, channel: &str) -> usize {
        self.read().get(channel).map_or(0, Vec::len)
    }

    pub fn count_total(&self) -> usize {
        self.read().values().map(Vec::len).sum()
    }

    /// Drops every handle whose connection reports closed, across all channels.
    /// Idempotent. Returns the number of handles removed.
    pub fn sweep(&self) -> usize {
        let mut channels = self.write();
        let mut removed = 0;
        channels.retain(|_, handles| {
            let before = handles.len();
            handles.retain(|h| !h.is_closed());
            removed += before - handles.len();
            !handles.is_empty()
        });
        removed
    }

    /// Forgets every handle. Streams end once their last handle is released.
    pub fn clear(&self) -> usize {
        let mut channels = self.write();
        let removed = channels.values().map(Vec::len).sum();
        channels.clear();
        removed
    }
}
