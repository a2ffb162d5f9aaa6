use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::frame::EventFrame;

/// Identity of a registered stream handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The receiving side has gone away.
    #[error("stream closed")]
    Closed,
    /// The subscriber is not draining its buffer.
    #[error("stream buffer full")]
    Full,
}

/// One subscriber's writable output.
///
/// `write` must not block: the broadcaster calls it for every handle of a
/// channel in sequence.
pub trait EventSink: Send + Sync {
    /// Cheap liveness check performed before any write.
    fn is_closed(&self) -> bool;

    fn write(&self, frame: &EventFrame) -> Result<(), SinkError>;
}

/// Sink backed by a bounded channel whose receiver feeds an HTTP response stream.
pub struct ChannelSink {
    tx: mpsc::Sender<EventFrame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<EventFrame>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn write(&self, frame: &EventFrame) -> Result<(), SinkError> {
        self.tx.try_send(frame.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// A registered subscriber output. Cloning shares the sink and keeps the identity.
#[derive(Clone)]
pub struct StreamHandle {
    id: HandleId,
    sink: Arc<dyn EventSink>,
}

impl StreamHandle {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { id: HandleId::new(), sink }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    pub fn write(&self, frame: &EventFrame) -> Result<(), SinkError> {
        self.sink.write(frame)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = StreamHandle::new(Arc::new(ChannelSink::new(tx)));
        handle.write(&EventFrame::new("ping", "1".into())).unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.event, "ping");
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_and_full() {
        let (tx, rx) = mpsc::channel(1);
        let handle = StreamHandle::new(Arc::new(ChannelSink::new(tx)));
        handle.write(&EventFrame::new("a", "1".into())).unwrap();
        assert_eq!(handle.write(&EventFrame::new("b", "2".into())), Err(SinkError::Full));

        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.write(&EventFrame::new("c", "3".into())), Err(SinkError::Closed));
    }

    #[test]
    fn test_clones_share_identity() {
        let (tx, _rx) = mpsc::channel(1);
        let a = StreamHandle::new(Arc::new(ChannelSink::new(tx)));
        let b = a.clone();
        assert_eq!(a.id(), b.id());
    }
}
