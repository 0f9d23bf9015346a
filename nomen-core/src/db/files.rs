//! File record persistence.
//!
//! Records are stored as one row per file with JSON columns for the
//! structured snapshots (technical, bext, info, custom_fields, analysis).

use nomen_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{
    AnalysisResult, BextInfo, FileRecord, FileStatus, MetadataFields, RiffInfo, TechnicalInfo,
    METADATA_FIELDS,
};

/// Optional filters for [`list_files`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<FileStatus>,
    pub category: Option<String>,
    /// Case-insensitive match over filename, fx_name, description,
    /// keywords, category, and subcategory.
    pub search: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

impl ListFilter {
    pub fn all() -> Self {
        Self {
            limit: 100_000,
            ..Default::default()
        }
    }
}

/// Insert a record, or update the existing row with the same path.
/// Returns the row's id (the existing one on conflict).
pub async fn upsert_file(pool: &SqlitePool, record: &FileRecord) -> Result<Uuid> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM files WHERE path = ?")
        .bind(&record.path)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some((id_str,)) => {
            let id = parse_uuid(&id_str)?;
            let mut updated = record.clone();
            updated.id = id;
            update_record(pool, &updated).await?;
            Ok(id)
        }
        None => {
            insert_file(pool, record).await?;
            Ok(record.id)
        }
    }
}

/// Insert a new record. Fails on path collision.
pub async fn insert_file(pool: &SqlitePool, record: &FileRecord) -> Result<()> {
    let sql = format!(
        "INSERT INTO files (id, path, filename, directory, status, changed_fields, file_hash, \
         {meta}, suggested_filename, rename_on_save, technical, bext, info, custom_fields, \
         analysis, imported_at, modified_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, {placeholders}, ?, ?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))",
        meta = METADATA_FIELDS.join(", "),
        placeholders = vec!["?"; METADATA_FIELDS.len()].join(", "),
    );

    let mut query = sqlx::query(&sql)
        .bind(record.id.to_string())
        .bind(&record.path)
        .bind(&record.filename)
        .bind(&record.directory)
        .bind(record.status.as_str())
        .bind(to_json(&record.changed_fields)?)
        .bind(&record.file_hash);
    for name in METADATA_FIELDS {
        query = query.bind(record.fields.get(name).map(|s| s.to_string()));
    }
    query = query
        .bind(&record.suggested_filename)
        .bind(record.rename_on_save as i64)
        .bind(to_json(&record.technical)?)
        .bind(to_json_opt(&record.bext)?)
        .bind(to_json_opt(&record.info)?)
        .bind(to_json_opt(&record.custom_fields)?)
        .bind(to_json_opt(&record.analysis)?);

    query.execute(pool).await?;
    Ok(())
}

/// Rewrite every mutable column of an existing record.
pub async fn update_record(pool: &SqlitePool, record: &FileRecord) -> Result<()> {
    let meta_sets: Vec<String> = METADATA_FIELDS
        .iter()
        .map(|name| format!("{} = ?", name))
        .collect();
    let sql = format!(
        "UPDATE files SET path = ?, filename = ?, directory = ?, status = ?, \
         changed_fields = ?, file_hash = ?, {meta}, suggested_filename = ?, \
         rename_on_save = ?, technical = ?, bext = ?, info = ?, custom_fields = ?, \
         analysis = ?, modified_at = datetime('now') WHERE id = ?",
        meta = meta_sets.join(", "),
    );

    let mut query = sqlx::query(&sql)
        .bind(&record.path)
        .bind(&record.filename)
        .bind(&record.directory)
        .bind(record.status.as_str())
        .bind(to_json(&record.changed_fields)?)
        .bind(&record.file_hash);
    for name in METADATA_FIELDS {
        query = query.bind(record.fields.get(name).map(|s| s.to_string()));
    }
    query = query
        .bind(&record.suggested_filename)
        .bind(record.rename_on_save as i64)
        .bind(to_json(&record.technical)?)
        .bind(to_json_opt(&record.bext)?)
        .bind(to_json_opt(&record.info)?)
        .bind(to_json_opt(&record.custom_fields)?)
        .bind(to_json_opt(&record.analysis)?)
        .bind(record.id.to_string());

    let result = query.execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(Error::FileNotFound(record.id.to_string()));
    }
    Ok(())
}

pub async fn get_file(pool: &SqlitePool, id: Uuid) -> Result<Option<FileRecord>> {
    let row = sqlx::query("SELECT * FROM files WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(|r| row_to_record(&r)).transpose()
}

pub async fn get_file_by_path(pool: &SqlitePool, path: &str) -> Result<Option<FileRecord>> {
    let row = sqlx::query("SELECT * FROM files WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?;
    row.map(|r| row_to_record(&r)).transpose()
}

/// Query records with optional filters, ordered by path.
pub async fn list_files(pool: &SqlitePool, filter: &ListFilter) -> Result<Vec<FileRecord>> {
    let mut sql = String::from("SELECT * FROM files");
    let mut clauses: Vec<&str> = Vec::new();

    if filter.status.is_some() {
        clauses.push("status = ?");
    }
    if filter.category.is_some() {
        clauses.push("category = ?");
    }
    if filter.search.is_some() {
        clauses.push(
            "(filename LIKE ? OR fx_name LIKE ? OR description LIKE ? \
             OR keywords LIKE ? OR category LIKE ? OR subcategory LIKE ?)",
        );
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY path LIMIT ? OFFSET ?");

    let mut query = sqlx::query(&sql);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(category) = &filter.category {
        query = query.bind(category.clone());
    }
    if let Some(search) = &filter.search {
        let like = format!("%{}%", search);
        for _ in 0..6 {
            query = query.bind(like.clone());
        }
    }
    let limit = if filter.limit > 0 { filter.limit } else { 1000 };
    query = query.bind(limit).bind(filter.offset);

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_record).collect()
}

/// Records whose path starts with the given directory prefix.
pub async fn list_under_directory(pool: &SqlitePool, prefix: &str) -> Result<Vec<(Uuid, String)>> {
    let like = format!(
        "{}{}%",
        prefix.trim_end_matches(std::path::MAIN_SEPARATOR),
        std::path::MAIN_SEPARATOR
    );
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT id, path FROM files WHERE path LIKE ?")
            .bind(like)
            .fetch_all(pool)
            .await?;
    rows.into_iter()
        .map(|(id, path)| Ok((parse_uuid(&id)?, path)))
        .collect()
}

/// Delete records by id. Returns the number of rows removed.
pub async fn delete_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut tx = pool.begin().await?;
    let mut removed = 0u64;
    for id in ids {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        removed += result.rows_affected();
    }
    tx.commit().await?;
    Ok(removed)
}

pub async fn count_files(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn clear_files(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM files").execute(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord> {
    let id: String = row.try_get("id")?;
    let status_str: String = row.try_get("status")?;
    let status = FileStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("Invalid status in database: {}", status_str)))?;

    let mut fields = MetadataFields::default();
    for name in METADATA_FIELDS {
        let value: Option<String> = row.try_get(name)?;
        fields.set(name, value);
    }

    let technical: TechnicalInfo = from_json(&row.try_get::<String, _>("technical")?)?;
    let changed_fields: Vec<String> = from_json(&row.try_get::<String, _>("changed_fields")?)?;
    let bext: Option<BextInfo> = from_json_opt(row.try_get("bext")?)?;
    let info: Option<RiffInfo> = from_json_opt(row.try_get("info")?)?;
    let custom_fields: Option<BTreeMap<String, String>> =
        from_json_opt(row.try_get("custom_fields")?)?;
    let analysis: Option<AnalysisResult> = from_json_opt(row.try_get("analysis")?)?;

    Ok(FileRecord {
        id: parse_uuid(&id)?,
        path: row.try_get("path")?,
        filename: row.try_get("filename")?,
        directory: row.try_get("directory")?,
        status,
        changed_fields,
        file_hash: row.try_get("file_hash")?,
        technical,
        fields,
        custom_fields,
        suggested_filename: row.try_get("suggested_filename")?,
        rename_on_save: row.try_get::<i64, _>("rename_on_save")? != 0,
        bext,
        info,
        analysis,
        suggestions: None,
    })
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("JSON encode failed: {}", e)))
}

fn to_json_opt<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value.as_ref().map(|v| to_json(v)).transpose()
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Internal(format!("JSON decode failed: {}", e)))
}

fn from_json_opt<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.as_deref().map(from_json).transpose()
}
