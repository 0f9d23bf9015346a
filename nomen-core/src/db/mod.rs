//! Embedded SQLite store for file records and the analysis cache.

pub mod analysis_cache;
pub mod files;
pub mod schema;

use nomen_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool and schema.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    schema::initialize_schema(&pool).await?;
    Ok(pool)
}

/// In-memory pool with initialized schema, for tests.
///
/// Pinned to one connection: every pooled connection to `:memory:` would
/// otherwise see its own empty database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;
    schema::initialize_schema(&pool).await?;
    Ok(pool)
}
