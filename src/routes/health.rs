use std::time::Duration;

use crate::state::AppState;
use crate::store::RecordStore;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sysinfo::{ProcessesToUpdate, System};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

// Liveness plus store reachability; 503 when the store does not answer in time
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ping = state.posts.data().store().ping();
    let connected = match tokio::time::timeout(PING_TIMEOUT, ping).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("health check: store ping failed: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("health check: store ping timed out after {:?}", PING_TIMEOUT);
            false
        }
    };
    let (rss_bytes, virtual_bytes) = process_memory();
    let status = if connected { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status": if connected { "ok" } else { "degraded" },
        "uptime_seconds": state.metrics.uptime_seconds(),
        "memory": { "rss_bytes": rss_bytes, "virtual_bytes": virtual_bytes },
        "database": if connected { "connected" } else { "disconnected" },
        "sse_subscribers": state.broadcaster.registry().count_total(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (status, Json(body))
}

fn process_memory() -> (u64, u64) {
    let mut system = System::new();
    let Ok(pid) = sysinfo::get_current_pid() else {
        return (0, 0);
    };
    let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    system.process(pid).map_or((0, 0), |p| (p.memory(), p.virtual_memory()))
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.get_snapshot().to_prometheus();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
