//! HTTP route handlers.
//!
//! - `health`: liveness, metrics and build info
//! - `events`: SSE subscriptions and channel listing
//! - `posts`: CRUD for the `posts` resource

pub mod events;
pub mod health;
pub mod posts;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "code": "ROUTE_NOT_FOUND",
                "message": "The requested route does not exist",
            },
            "status": 404,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
