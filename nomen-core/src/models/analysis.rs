//! Cached ML analysis results

use serde::{Deserialize, Serialize};

/// A single UCS classification hit from the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMatch {
    pub cat_id: String,
    pub category: String,
    pub subcategory: String,
    pub category_full: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Full analysis output for a file, cached by content hash.
///
/// Stores the raw classifier ranking (top 50, no filename boost) so that
/// re-ranking can pull correct CatIDs from deeper ranks after a rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub classification: Vec<ClassificationMatch>,
    pub caption: Option<String>,
    pub model_version: String,
    /// RFC 3339 timestamp of the analysis run.
    pub analyzed_at: String,
}

/// Number of classifier candidates retained in the cache.
pub const CACHED_CANDIDATES: usize = 50;
