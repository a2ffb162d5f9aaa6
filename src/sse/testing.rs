//! In-memory sinks for exercising the registry and broadcaster without HTTP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::frame::EventFrame;
use super::handle::{EventSink, SinkError, StreamHandle};

/// Records every encoded frame written to it. Can be closed, or made to fail
/// writes while still reporting itself open.
#[derive(Default)]
pub struct RecordingSink {
    written: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingSink {
    pub fn handle() -> (StreamHandle, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (StreamHandle::new(sink.clone()), sink)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn write(&self, frame: &EventFrame) -> Result<(), SinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        if let Ok(mut w) = self.written.lock() {
            w.push(frame.encode());
        }
        Ok(())
    }
}
