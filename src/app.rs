use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::from_fn_with_state;
use axum::{routing::get, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::middleware::{self, request_id::RequestSpan};
use crate::routes;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

// Compression would buffer event streams, so SSE is never compressed.
#[derive(Clone)]
struct NoSseDefault(DefaultPredicate);

impl Predicate for NoSseDefault {
    fn should_compress<B: axum::body::HttpBody>(&self, res: &axum::http::Response<B>) -> bool {
        if let Some(ct) = res.headers().get(CONTENT_TYPE) {
            if let Ok(s) = ct.to_str() {
                if s.starts_with("text/event-stream") {
                    return false;
                }
            }
        }
        self.0.should_compress(res)
    }
}

/// The full HTTP surface with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let compression = CompressionLayer::new().compress_when(NoSseDefault(DefaultPredicate::new()));
    let cfg_arc = state.config.clone();
    let cors = middleware::cors::layer(&state.config.cors);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/metrics/prometheus", get(routes::health::metrics_prometheus))
        .route("/version", get(routes::health::version))
        .route("/api/events", get(routes::events::subscribe))
        .route("/api/events/channels", get(routes::events::list_channels))
        .route("/api/posts", get(routes::posts::list_posts).post(routes::posts::create_post))
        .route(
            "/api/posts/{id}",
            get(routes::posts::get_post).patch(routes::posts::update_post).delete(routes::posts::delete_post),
        )
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit::rate_limit_middleware))
        .with_state(state)
        .layer(compression)
        .layer(from_fn_with_state(cfg_arc, middleware::security_headers::security_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(middleware::request_id::propagate_layer())
        .layer(middleware::request_id::set_layer())
        .layer(CatchPanicLayer::custom(crate::error::panic_response))
        .layer(cors)
}
