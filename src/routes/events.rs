use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::sse::{ChannelRegistry, ChannelSink, EventFrame, HandleId, StreamHandle, WILDCARD_CHANNEL};
use crate::state::AppState;
use crate::types::{ChannelInfo, ChannelsResponse, EventsQuery};

const MAX_CHANNELS_PER_STREAM: usize = 16;
const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Unsubscribes a stream's handles when the response body is dropped.
struct Subscription {
    registry: ChannelRegistry,
    metrics: Metrics,
    handles: Vec<(String, HandleId)>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for (channel, id) in &self.handles {
            self.registry.unsubscribe(channel, *id);
        }
        self.metrics.sse_disconnected();
        tracing::debug!(channels = self.handles.len(), "sse stream closed");
    }
}

pub async fn subscribe(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let channels = parse_channels(q.channels.as_deref())?;
    let sse_cfg = &state.config.sse;

    let (tx, rx) = mpsc::channel::<EventFrame>(sse_cfg.buffer_size);
    let hello = EventFrame::new("connected", json!({ "channels": channels }).to_string());
    tx.try_send(hello).map_err(|_| AppError::ServiceUnavailable("event stream unavailable".into()))?;

    let registry = state.broadcaster.registry().clone();
    let sink = Arc::new(ChannelSink::new(tx));
    let mut handles = Vec::with_capacity(channels.len());
    for channel in &channels {
        let handle = StreamHandle::new(sink.clone());
        handles.push((channel.clone(), handle.id()));
        registry.subscribe(channel, handle);
    }
    state.metrics.sse_connected();
    tracing::debug!(?channels, "sse stream opened");

    let guard = Subscription { registry, metrics: state.metrics.clone(), handles };
    let stream = ReceiverStream::new(rx).map(move |frame| {
        let _subscription = &guard;
        Ok::<Event, Infallible>(Event::from(frame))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(sse_cfg.keep_alive_secs))))
}

pub async fn list_channels(State(state): State<AppState>) -> Json<ChannelsResponse> {
    let registry = state.broadcaster.registry();
    let channels: Vec<ChannelInfo> = registry
        .list_channels()
        .into_iter()
        .map(|name| {
            let subscribers = registry.count_in_channel(&name);
            ChannelInfo { name, subscribers }
        })
        .collect();
    Json(ChannelsResponse { channels, total_subscribers: registry.count_total() })
}

/// Comma-separated, deduplicated channel names. Absent or blank means the wildcard channel.
fn parse_channels(raw: Option<&str>) -> AppResult<Vec<String>> {
    let mut channels: Vec<String> = Vec::new();
    for name in raw.unwrap_or_default().split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if name.len() > MAX_CHANNEL_NAME_LEN
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        {
            return Err(AppError::ValidationError {
                field: "channels".into(),
                message: format!("invalid channel name '{}'", name),
            });
        }
        if !channels.iter().any(|c| c == name) {
            channels.push(name.to_string());
        }
    }
    if channels.is_empty() {
        channels.push(WILDCARD_CHANNEL.to_string());
    }
    if channels.len() > MAX_CHANNELS_PER_STREAM {
        return Err(AppError::ValidationError {
            field: "channels".into(),
            message: format!("at most {} channels per stream", MAX_CHANNELS_PER_STREAM),
        });
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channels() {
        assert_eq!(parse_channels(None).unwrap(), vec!["all"]);
        assert_eq!(parse_channels(Some(" , ")).unwrap(), vec!["all"]);
        assert_eq!(parse_channels(Some("posts, posts:1,posts")).unwrap(), vec!["posts", "posts:1"]);
        assert!(parse_channels(Some("bad channel")).is_err());
        let many = (0..=MAX_CHANNELS_PER_STREAM).map(|i| format!("c{i}")).collect::<Vec<_>>().join(",");
        assert!(parse_channels(Some(&many)).is_err());
    }
}
