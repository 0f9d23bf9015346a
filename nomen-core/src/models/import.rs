//! Import and save operation results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::file_record::FileRecord;

/// Result of a directory import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub files: Vec<FileRecord>,
    pub count: usize,
    pub skipped: usize,
    /// Paths that could not be read as WAV files.
    pub skipped_paths: Vec<String>,
    pub import_time_ms: u64,
    /// True when the import was interrupted by cancellation.
    pub cancelled: bool,
}

/// Result of saving a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub file: FileRecord,
    pub old_path: String,
    pub new_path: String,
    pub renamed: bool,
    pub copied: bool,
    pub copy_path: Option<String>,
}

/// Per-file entry in a batch save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSaveResult {
    pub id: Uuid,
    pub success: bool,
    pub renamed: bool,
    pub new_path: Option<String>,
    /// Stable error code when the save failed.
    pub error_code: Option<String>,
    pub error: Option<String>,
}

/// Result of a batch save. Always complete — failures are entries, not
/// aborts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSaveOutcome {
    pub results: Vec<BatchSaveResult>,
    pub saved_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
}

/// Per-file entry in a batch analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalyzeResult {
    pub id: Uuid,
    pub success: bool,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

/// Result of a batch analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalyzeOutcome {
    pub results: Vec<BatchAnalyzeResult>,
    pub analyzed_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
}
