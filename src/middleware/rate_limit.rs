use super::ip::client_ip;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, net::IpAddr, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Paths that are never limited.
const EXEMPT_PATHS: &[&str] = &["/health"];

/// A thread-safe per-IP rate limiter based on the sliding window algorithm.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg.max_requests, cfg.window_seconds)
    }

    /// Records the request if `ip` is under its limit.
    ///
    /// Returns `AppError::RateLimited` with the seconds until the oldest
    /// request in the window expires.
    pub async fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let timestamps = requests.entry(ip).or_default();
        timestamps.retain(|&t| now.saturating_duration_since(t) < self.window);

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let remaining = self.window.saturating_sub(now.saturating_duration_since(oldest));
            // Round up so clients never retry a moment too early
            let retry_after_seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Err(AppError::RateLimited { retry_after_seconds: retry_after_seconds.max(1) });
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops expired timestamps and forgets IPs with none left.
    pub async fn cleanup_old_entries(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.saturating_duration_since(t) < self.window);
            !timestamps.is_empty()
        });
        before - requests.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Runs [`cleanup_old_entries`](Self::cleanup_old_entries) every `period` until cancelled.
    pub fn spawn_cleanup(&self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.cleanup_old_entries().await;
                        if removed > 0 {
                            tracing::debug!(removed, "rate limiter cleanup");
                        }
                    }
                }
            }
        })
    }
}

/// Global per-IP limit using the limiter held in [`AppState`].
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }
    let ip = client_ip(&req);
    match state.rate_limiter.check(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => {
            state.metrics.inc_rate_limited();
            tracing::warn!(%ip, path = %req.uri().path(), "rate limit exceeded");
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(3, 1);
        let ip = IpAddr::from([127, 0, 0, 1]);

        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_ok());

        match limiter.check(ip).await {
            Err(AppError::RateLimited { retry_after_seconds }) => assert_eq!(retry_after_seconds, 1),
            other => panic!("expected RateLimited, got {:?}", other),
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(limiter.check(ip).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_ips() {
        let limiter = RateLimiter::new(1, 60);
        let ip1 = IpAddr::from([127, 0, 0, 1]);
        let ip2 = IpAddr::from([127, 0, 0, 2]);

        assert!(limiter.check(ip1).await.is_ok());
        assert!(limiter.check(ip2).await.is_ok());

        assert!(limiter.check(ip1).await.is_err());
        assert!(limiter.check(ip2).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_forgets_idle_clients() {
        let limiter = RateLimiter::new(5, 10);
        limiter.check(IpAddr::from([10, 0, 0, 1])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        limiter.check(IpAddr::from([10, 0, 0, 2])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(limiter.cleanup_old_entries().await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }
}
