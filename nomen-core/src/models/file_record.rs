//! File record — one WAV file and all its metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::suggestions::SuggestionsResult;

/// All 22 nullable metadata field names, in canonical order.
///
/// Shared by the DB layer (column order), the WAV writer (write-set
/// assembly) and field-driven operations (apply-metadata, changed-field
/// tracking).
pub const METADATA_FIELDS: [&str; 22] = [
    "category",
    "subcategory",
    "cat_id",
    "category_full",
    "user_category",
    "fx_name",
    "description",
    "keywords",
    "notes",
    "designer",
    "library",
    "project",
    "microphone",
    "mic_perspective",
    "rec_medium",
    "release_date",
    "rating",
    "is_designed",
    "manufacturer",
    "rec_type",
    "creator_id",
    "source_id",
];

/// Lifecycle status of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Unmodified,
    Modified,
    Saved,
    Flagged,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Unmodified => "unmodified",
            FileStatus::Modified => "modified",
            FileStatus::Saved => "saved",
            FileStatus::Flagged => "flagged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unmodified" => Some(FileStatus::Unmodified),
            "modified" => Some(FileStatus::Modified),
            "saved" => Some(FileStatus::Saved),
            "flagged" => Some(FileStatus::Flagged),
            _ => None,
        }
    }
}

/// Read-only technical fields from the `fmt ` + `data` chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalInfo {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    pub duration_seconds: f64,
    pub frame_count: u64,
    /// `"PCM"` for format code 1, otherwise the code as `0xNNNN`.
    pub audio_format: String,
    pub file_size_bytes: u64,
}

/// Read-only snapshot of the BEXT chunk as found on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BextInfo {
    pub description: Option<String>,
    pub originator: Option<String>,
    pub originator_ref: Option<String>,
    pub origination_date: Option<String>,
    pub origination_time: Option<String>,
    pub time_reference: Option<u64>,
    pub coding_history: Option<String>,
}

/// Read-only snapshot of the RIFF LIST-INFO chunk as found on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiffInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub created_date: Option<String>,
    pub software: Option<String>,
    pub copyright: Option<String>,
    pub product: Option<String>,
    pub keywords: Option<String>,
}

impl RiffInfo {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.genre.is_none()
            && self.comment.is_none()
            && self.created_date.is_none()
            && self.software.is_none()
            && self.copyright.is_none()
            && self.product.is_none()
            && self.keywords.is_none()
    }
}

/// The 22 mutable metadata fields, addressable by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFields {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub cat_id: Option<String>,
    pub category_full: Option<String>,
    pub user_category: Option<String>,
    pub fx_name: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub notes: Option<String>,
    pub designer: Option<String>,
    pub library: Option<String>,
    pub project: Option<String>,
    pub microphone: Option<String>,
    pub mic_perspective: Option<String>,
    pub rec_medium: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<String>,
    pub is_designed: Option<String>,
    pub manufacturer: Option<String>,
    pub rec_type: Option<String>,
    pub creator_id: Option<String>,
    pub source_id: Option<String>,
}

impl MetadataFields {
    /// Get a field value by canonical name. Returns `None` for unknown names.
    pub fn get(&self, name: &str) -> Option<&str> {
        let slot = match name {
            "category" => &self.category,
            "subcategory" => &self.subcategory,
            "cat_id" => &self.cat_id,
            "category_full" => &self.category_full,
            "user_category" => &self.user_category,
            "fx_name" => &self.fx_name,
            "description" => &self.description,
            "keywords" => &self.keywords,
            "notes" => &self.notes,
            "designer" => &self.designer,
            "library" => &self.library,
            "project" => &self.project,
            "microphone" => &self.microphone,
            "mic_perspective" => &self.mic_perspective,
            "rec_medium" => &self.rec_medium,
            "release_date" => &self.release_date,
            "rating" => &self.rating,
            "is_designed" => &self.is_designed,
            "manufacturer" => &self.manufacturer,
            "rec_type" => &self.rec_type,
            "creator_id" => &self.creator_id,
            "source_id" => &self.source_id,
            _ => return None,
        };
        slot.as_deref()
    }

    /// Set a field by canonical name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: Option<String>) -> bool {
        let slot = match name {
            "category" => &mut self.category,
            "subcategory" => &mut self.subcategory,
            "cat_id" => &mut self.cat_id,
            "category_full" => &mut self.category_full,
            "user_category" => &mut self.user_category,
            "fx_name" => &mut self.fx_name,
            "description" => &mut self.description,
            "keywords" => &mut self.keywords,
            "notes" => &mut self.notes,
            "designer" => &mut self.designer,
            "library" => &mut self.library,
            "project" => &mut self.project,
            "microphone" => &mut self.microphone,
            "mic_perspective" => &mut self.mic_perspective,
            "rec_medium" => &mut self.rec_medium,
            "release_date" => &mut self.release_date,
            "rating" => &mut self.rating,
            "is_designed" => &mut self.is_designed,
            "manufacturer" => &mut self.manufacturer,
            "rec_type" => &mut self.rec_type,
            "creator_id" => &mut self.creator_id,
            "source_id" => &mut self.source_id,
            _ => return false,
        };
        *slot = value.filter(|v| !v.is_empty());
        true
    }

    /// All non-empty fields as a name → value map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for name in METADATA_FIELDS {
            if let Some(value) = self.get(name) {
                map.insert(name.to_string(), value.to_string());
            }
        }
        map
    }
}

/// Central record — one WAV file and all its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    // Identity
    pub id: Uuid,
    pub path: String,
    pub filename: String,
    pub directory: String,

    // Status
    pub status: FileStatus,
    /// Field names modified since last save, sorted.
    #[serde(default)]
    pub changed_fields: Vec<String>,
    /// Cheap stable fingerprint, lowercase hex.
    pub file_hash: String,

    // Technical (read-only)
    pub technical: TechnicalInfo,

    // Mutable metadata
    #[serde(flatten)]
    pub fields: MetadataFields,

    /// User-defined iXML USER-block tags.
    pub custom_fields: Option<BTreeMap<String, String>>,

    // Filename generation
    pub suggested_filename: Option<String>,
    #[serde(default = "default_rename_on_save")]
    pub rename_on_save: bool,

    // Embedded chunk snapshots (read-only)
    pub bext: Option<BextInfo>,
    pub info: Option<RiffInfo>,

    // Analysis + recomputed suggestions (suggestions never persisted)
    pub analysis: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<SuggestionsResult>,
}

fn default_rename_on_save() -> bool {
    true
}

/// Partial metadata update. Keys must be canonical field names (plus
/// `suggested_filename`); a `None` value clears the field.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub fields: BTreeMap<String, Option<String>>,
    /// Merged (unioned) into the record's custom fields, not replaced.
    pub custom_fields: Option<BTreeMap<String, String>>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.custom_fields.is_none()
    }

    /// Convenience constructor for single-field patches.
    pub fn set(name: &str, value: impl Into<String>) -> Self {
        let mut patch = Self::default();
        patch.fields.insert(name.to_string(), Some(value.into()));
        patch
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), Some(value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_get_set_by_name() {
        let mut fields = MetadataFields::default();
        assert!(fields.set("fx_name", Some("Door Slam".to_string())));
        assert_eq!(fields.get("fx_name"), Some("Door Slam"));
        assert!(!fields.set("no_such_field", Some("x".to_string())));
        assert_eq!(fields.get("no_such_field"), None);
    }

    #[test]
    fn empty_string_clears_field() {
        let mut fields = MetadataFields::default();
        fields.set("notes", Some("temp".to_string()));
        fields.set("notes", Some(String::new()));
        assert_eq!(fields.notes, None);
    }

    #[test]
    fn to_map_skips_nulls() {
        let mut fields = MetadataFields::default();
        fields.set("category", Some("DOORS".to_string()));
        fields.set("cat_id", Some("DOORWood".to_string()));
        let map = fields.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["category"], "DOORS");
    }

    #[test]
    fn status_round_trips() {
        for status in [
            FileStatus::Unmodified,
            FileStatus::Modified,
            FileStatus::Saved,
            FileStatus::Flagged,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::parse("bogus"), None);
    }
}
