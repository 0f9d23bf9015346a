//! Data models for the NomenAudio core

pub mod analysis;
pub mod file_record;
pub mod import;
pub mod suggestions;

pub use analysis::{AnalysisResult, ClassificationMatch, CACHED_CANDIDATES};
pub use file_record::{
    BextInfo, FileRecord, FileStatus, MetadataFields, MetadataPatch, RiffInfo, TechnicalInfo,
    METADATA_FIELDS,
};
pub use import::{
    BatchAnalyzeOutcome, BatchAnalyzeResult, BatchSaveOutcome, BatchSaveResult, ImportOutcome,
    SaveOutcome,
};
pub use suggestions::{Suggestion, SuggestionSource, SuggestionsResult};
