use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// 创建 SQLite 连接池并执行内嵌迁移
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, anyhow::Error> {
    ensure_parent_dir(database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

// sqlite://data/x.db -> data/
fn ensure_parent_dir(database_url: &str) {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if path.starts_with(':') || path.is_empty() {
        return;
    }

    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::warn!("Failed to create database directory {:?}: {}", parent, e);
    }
}
