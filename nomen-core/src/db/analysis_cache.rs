//! Analysis cache — classifier output keyed by content hash.
//!
//! Entries survive renames of the backing file (the key is the content
//! fingerprint, not the path) and are wiped only by an explicit reset.

use nomen_common::{Error, Result};
use sqlx::SqlitePool;

use crate::models::{AnalysisResult, ClassificationMatch, CACHED_CANDIDATES};

/// Fetch a cached analysis by content hash.
pub async fn get_cached_analysis(
    pool: &SqlitePool,
    file_hash: &str,
) -> Result<Option<AnalysisResult>> {
    let row: Option<(String, Option<String>, String, String)> = sqlx::query_as(
        "SELECT classification, caption, model_version, created_at \
         FROM analysis_cache WHERE file_hash = ?",
    )
    .bind(file_hash)
    .fetch_optional(pool)
    .await?;

    let Some((classification_json, caption, model_version, created_at)) = row else {
        return Ok(None);
    };
    let classification: Vec<ClassificationMatch> = serde_json::from_str(&classification_json)
        .map_err(|e| Error::Internal(format!("Corrupt analysis cache entry: {}", e)))?;

    Ok(Some(AnalysisResult {
        classification,
        caption,
        model_version,
        analyzed_at: created_at,
    }))
}

/// Store or replace a cached analysis. The classification list is
/// truncated to the top candidates before storage.
pub async fn store_cached_analysis(
    pool: &SqlitePool,
    file_hash: &str,
    classification: &[ClassificationMatch],
    caption: Option<&str>,
    model_version: &str,
    analyzed_at: &str,
) -> Result<()> {
    let retained = &classification[..classification.len().min(CACHED_CANDIDATES)];
    let classification_json = serde_json::to_string(retained)
        .map_err(|e| Error::Internal(format!("JSON encode failed: {}", e)))?;

    sqlx::query(
        "INSERT OR REPLACE INTO analysis_cache \
         (file_hash, classification, caption, model_version, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(file_hash)
    .bind(classification_json)
    .bind(caption)
    .bind(model_version)
    .bind(analyzed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_analysis_cache(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM analysis_cache").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    fn hit(cat_id: &str, confidence: f64) -> ClassificationMatch {
        ClassificationMatch {
            cat_id: cat_id.to_string(),
            category: "DOORS".to_string(),
            subcategory: "WOOD".to_string(),
            category_full: "DOORS-WOOD".to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn store_and_fetch_round_trip() {
        let pool = init_memory_pool().await.unwrap();
        let hits = vec![hit("DOORWood", 0.8), hit("DOORCreak", 0.2)];
        store_cached_analysis(&pool, "hash1", &hits, Some("A door slams."), "2023", "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let loaded = get_cached_analysis(&pool, "hash1").await.unwrap().unwrap();
        assert_eq!(loaded.classification.len(), 2);
        assert_eq!(loaded.classification[0].cat_id, "DOORWood");
        assert_eq!(loaded.caption.as_deref(), Some("A door slams."));
        assert_eq!(loaded.model_version, "2023");

        assert!(get_cached_analysis(&pool, "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn classification_truncated_to_candidate_cap() {
        let pool = init_memory_pool().await.unwrap();
        let hits: Vec<ClassificationMatch> =
            (0..80).map(|i| hit(&format!("CAT{:03}", i), 0.5)).collect();
        store_cached_analysis(&pool, "hash2", &hits, None, "2023", "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let loaded = get_cached_analysis(&pool, "hash2").await.unwrap().unwrap();
        assert_eq!(loaded.classification.len(), CACHED_CANDIDATES);
    }

    #[tokio::test]
    async fn clear_wipes_entries() {
        let pool = init_memory_pool().await.unwrap();
        store_cached_analysis(&pool, "hash3", &[hit("DOORWood", 0.9)], None, "2023", "t")
            .await
            .unwrap();
        clear_analysis_cache(&pool).await.unwrap();
        assert!(get_cached_analysis(&pool, "hash3").await.unwrap().is_none());
    }
}
