//! Integration and unit tests that span several modules.
//!
//! - **api_tests**: HTTP surface through the full middleware stack
//! - **service_tests**: data service semantics against SQLite and stub stores
//! - **config_tests**: configuration layering and validation
//! - **error_tests**: error codes, statuses and JSON bodies

pub mod error_tests;
pub mod service_tests;

use axum::Router;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::state::AppState;

/// A fully wired application over a throwaway SQLite file.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

pub async fn test_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("test.db").display());
    config.database.max_connections = 4;
    configure(&mut config);

    let pool = crate::db::connect(&config.database).await.unwrap();
    crate::db::init_db(&pool).await.unwrap();
    let state = AppState::init(pool, config).await.unwrap();
    let router = crate::app::build_router(state.clone());
    TestApp { router, state, _dir: dir }
}
