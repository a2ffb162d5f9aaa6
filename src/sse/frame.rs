use serde::Serialize;
use serde_json::Value;

/// An event as constructed at broadcast time. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvent {
    pub event_type: String,
    pub payload: Value,
    /// RFC 3339 UTC timestamp of construction.
    pub timestamp: String,
    pub channel: String,
}

impl ChannelEvent {
    pub fn new(channel: &str, event_type: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
            timestamp: chrono::Utc::now().to_rfc3339(),
            channel: channel.to_string(),
        }
    }

    pub fn to_frame(&self) -> EventFrame {
        EventFrame::new(&self.event_type, self.payload.to_string())
    }
}

/// A single Server-Sent-Events frame: one `event:` line and one `data:` line.
///
/// `data` is already JSON-encoded and therefore never contains a raw newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub event: String,
    pub data: String,
}

impl EventFrame {
    pub fn new(event: &str, data: String) -> Self {
        // Event names are a single line on the wire
        let event = event.replace(['\r', '\n'], " ");
        Self { event, data }
    }

    /// Wire encoding: `event: <type>\ndata: <json>\n\n`.
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

impl From<EventFrame> for axum::response::sse::Event {
    fn from(frame: EventFrame) -> Self {
        axum::response::sse::Event::default().event(frame.event).data(frame.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_matches_sse_framing() {
        let ev = ChannelEvent::new("orders", "created", json!({"id": 5}));
        assert_eq!(ev.to_frame().encode(), "event: created\ndata: {\"id\":5}\n\n");
    }

    #[test]
    fn test_multiline_string_payload_stays_on_one_data_line() {
        let ev = ChannelEvent::new("c", "note", json!("line one\nline two"));
        let wire = ev.to_frame().encode();
        assert_eq!(wire.matches('\n').count(), 3);
        assert!(wire.contains("data: \"line one\\nline two\"\n"));
    }

    #[test]
    fn test_event_name_newlines_are_flattened() {
        let frame = EventFrame::new("bad\nname", "{}".into());
        assert_eq!(frame.event, "bad name");
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ev = ChannelEvent::new("c", "t", Value::Null);
        assert!(chrono::DateTime::parse_from_rfc3339(&ev.timestamp).is_ok());
    }
}
