use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use ignitor::{app, config, db, logging, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (embedded defaults -> ignitor.toml -> $IGNITOR_CONFIG -> env)
    let app_cfg = config::load()?;
    let _log_guards = logging::init(&app_cfg.logging)?;
    info!(environment = %app_cfg.app.environment, "configuration loaded");

    let pool = db::connect(&app_cfg.database).await?;
    db::init_db(&pool).await?;

    let state = AppState::init(pool, app_cfg.clone()).await?;
    let shutdown = CancellationToken::new();

    let sweeper = state
        .broadcaster
        .spawn_sweeper(Duration::from_secs(app_cfg.sse.sweep_interval_secs), shutdown.child_token());
    let limiter_cleanup = state
        .rate_limiter
        .spawn_cleanup(Duration::from_secs(app_cfg.rate_limit.cleanup_interval_secs), shutdown.child_token());

    let registry = state.broadcaster.registry().clone();
    let router = app::build_router(state);

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Ignitor listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams only end once their handles are released
            let closed = registry.clear();
            info!(closed, "Closed SSE subscriptions");
        })
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(sweeper, limiter_cleanup);
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
