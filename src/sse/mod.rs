//! Server-Sent-Events fan-out keyed by channel name.
//!
//! - [`registry`]: which stream handles are subscribed to which channels
//! - [`broadcaster`]: frames events, delivers them, prunes dead handles, periodic sweep
//! - [`frame`]: the event record and its `event:`/`data:` wire framing
//! - [`handle`]: stream handle identity and the sink abstraction
//!
//! Channel state is process-local. A client connected to one instance never
//! sees broadcasts triggered on another.

pub mod broadcaster;
pub mod frame;
pub mod handle;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use broadcaster::{BroadcastError, BroadcastOutcome, Broadcaster};
pub use frame::{ChannelEvent, EventFrame};
pub use handle::{ChannelSink, EventSink, HandleId, SinkError, StreamHandle};
pub use registry::ChannelRegistry;

/// Channel every `created` event is also published to.
pub const WILDCARD_CHANNEL: &str = "all";
