use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
    Sqlite,
};
use tracing::info;

use crate::config::{ensure_sqlite_parent_dir, DatabaseConfig};

/// Creates the database file if needed and opens a pool with per-connection pragmas.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let db_url = &cfg.url;
    ensure_sqlite_parent_dir(db_url)?;
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        info!("Creating SQLite database at {}", db_url);
        Sqlite::create_database(db_url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(db_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Durability/performance pragmas are best-effort
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA temp_store=MEMORY;").execute(pool).await {
        tracing::warn!("Failed to set temp_store: {}", e);
    }
    // JSON1 is required for every resource query
    sqlx::query("SELECT json_extract('{\"a\":1}', '$.a')").execute(pool).await?;
    Ok(())
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`, the only names that are ever
/// interpolated into SQL.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Creates the document table for a resource plus one unique expression index per
/// `unique_fields` entry.
pub async fn ensure_resource_table(pool: &SqlitePool, table: &str, unique_fields: &[&str]) -> anyhow::Result<()> {
    if !is_safe_identifier(table) {
        return Err(anyhow::anyhow!("invalid table name: {}", table));
    }
    sqlx::query(&format!(
        r#"CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL CHECK (json_valid(data))
        )"#
    ))
    .execute(pool)
    .await?;

    for field in unique_fields {
        if !is_safe_identifier(field) {
            return Err(anyhow::anyhow!("invalid unique field for {}: {}", table, field));
        }
        let name = format!("idx_{table}_{field}_unique");
        let query = format!("CREATE UNIQUE INDEX IF NOT EXISTS {name} ON {table}(json_extract(data, '$.{field}'))");
        if let Err(e) = sqlx::query(&query).execute(pool).await {
            tracing::error!("Failed to create index {}: {}", name, e);
            return Err(anyhow::anyhow!("Migration failed: {}", e));
        }
        tracing::debug!("Ensured unique index {}", name);
    }

    Ok(())
}
