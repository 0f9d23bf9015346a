//! Database schema definitions.
//!
//! Two tables: `files` keyed by id with a unique path index, and
//! `analysis_cache` keyed by content hash. Analysis records outlive file
//! records and are wiped only by an explicit cache reset.

use nomen_common::Result;
use sqlx::SqlitePool;

/// Create all tables and indexes. Idempotent.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            path TEXT UNIQUE NOT NULL,
            filename TEXT NOT NULL,
            directory TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unmodified',
            changed_fields TEXT NOT NULL DEFAULT '[]',
            file_hash TEXT NOT NULL,

            -- 22 nullable metadata fields
            category TEXT,
            subcategory TEXT,
            cat_id TEXT,
            category_full TEXT,
            user_category TEXT,
            fx_name TEXT,
            description TEXT,
            keywords TEXT,
            notes TEXT,
            designer TEXT,
            library TEXT,
            project TEXT,
            microphone TEXT,
            mic_perspective TEXT,
            rec_medium TEXT,
            release_date TEXT,
            rating TEXT,
            is_designed TEXT,
            manufacturer TEXT,
            rec_type TEXT,
            creator_id TEXT,
            source_id TEXT,

            suggested_filename TEXT,
            rename_on_save INTEGER NOT NULL DEFAULT 1,

            -- JSON columns
            technical TEXT NOT NULL,
            bext TEXT,
            info TEXT,
            custom_fields TEXT,
            analysis TEXT,

            -- Timestamps
            imported_at TEXT,
            modified_at TEXT
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_path ON files (path)")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_cache (
            file_hash TEXT PRIMARY KEY,
            classification TEXT NOT NULL,
            caption TEXT,
            model_version TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
