// ABOUTME: Database connection management and schema initialization
// ABOUTME: Configures the SQLite pool and runs embedded migrations

use std::path::{Path, PathBuf};

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use crate::error::StorageError;

/// Directory holding the Crosspost database and local state.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".crosspost")
}

/// Initialize the pool at the default location (`~/.crosspost/crosspost.db`).
pub async fn init_pool() -> Result<SqlitePool, StorageError> {
    init_pool_at(data_dir().join("crosspost.db")).await
}

/// Initialize a pool at an explicit database path, creating the parent
/// directory if needed, then run migrations.
pub async fn init_pool_at(database_path: impl AsRef<Path>) -> Result<SqlitePool, StorageError> {
    let database_path = database_path.as_ref();

    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let database_url = format!("sqlite:{}?mode=rwc", database_path.display());
    debug!("Connecting to database: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

    info!("Database connection established");

    sqlx::migrate!("./migrations").run(&pool).await?;
    debug!("Database migrations completed");

    Ok(pool)
}
