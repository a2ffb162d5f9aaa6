use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::RateLimiter;
use crate::resources::{posts, PostService};
use crate::sse::{Broadcaster, ChannelRegistry};

/// Shared application state handed to every handler and stateful middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    /// Owns the channel registry; events reach subscribers only through it.
    pub broadcaster: Broadcaster,
    pub rate_limiter: RateLimiter,
    pub posts: Arc<PostService>,
}

impl AppState {
    /// Wires the services together. Resource tables must already exist
    /// (see [`AppState::init`]).
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> anyhow::Result<Self> {
        let metrics = Metrics::new();
        let broadcaster = Broadcaster::new(ChannelRegistry::new(), metrics.clone());
        let rate_limiter = RateLimiter::from_config(&config.rate_limit);
        let posts = PostService::new(db.clone(), config.services.clone())?
            .with_broadcaster(broadcaster.clone())
            .with_metrics(metrics.clone())
            .expose_error_details(!config.app.is_production());

        Ok(Self { db, config: Arc::new(config), metrics, broadcaster, rate_limiter, posts: Arc::new(posts) })
    }

    /// Ensures resource schemas, then builds the state.
    pub async fn init(db: sqlx::SqlitePool, config: AppConfig) -> anyhow::Result<Self> {
        posts::ensure_schema(&db).await?;
        Self::new(db, config)
    }
}
