//! Settings service — JSON-persisted application configuration.
//!
//! The settings document lives at a well-known path, writes are atomic
//! (temp file + rename), and unknown keys round-trip verbatim so newer
//! documents survive older builds.

use nomen_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::wav::ixml::validate_custom_tag;

/// Definition of a user-defined iXML USER tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDef {
    pub tag: String,
    pub label: String,
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i64,
    pub creator_id: String,
    pub source_id: String,
    pub library_name: String,
    pub library_template: String,
    pub rename_on_save_default: bool,
    pub custom_fields: Vec<CustomFieldDef>,
    /// Keys this build does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            creator_id: String::new(),
            source_id: String::new(),
            library_name: String::new(),
            library_template: "{source_id} {library_name}".to_string(),
            rename_on_save_default: true,
            custom_fields: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Partial settings update — only provided keys change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub creator_id: Option<String>,
    pub source_id: Option<String>,
    pub library_name: Option<String>,
    pub library_template: Option<String>,
    pub rename_on_save_default: Option<bool>,
    pub custom_fields: Option<Vec<CustomFieldDef>>,
}

/// Owns the settings document and its in-memory copy.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Load settings from disk, falling back to defaults when the file
    /// does not exist. A malformed document is a startup failure.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| {
                Error::Config(format!("Malformed settings file {}: {}", path.display(), e))
            })?
        } else {
            AppSettings::default()
        };
        Ok(Self {
            path,
            current: RwLock::new(settings),
        })
    }

    /// Current settings snapshot.
    pub fn get(&self) -> AppSettings {
        self.current.read().expect("settings lock poisoned").clone()
    }

    /// Merge a partial update, validate, persist atomically, and swap the
    /// in-memory copy. Subsequent suggestion recomputations see the new
    /// values immediately.
    pub fn update(&self, update: SettingsUpdate) -> Result<AppSettings> {
        let mut merged = self.get();
        if let Some(creator_id) = update.creator_id {
            merged.creator_id = creator_id;
        }
        if let Some(source_id) = update.source_id {
            merged.source_id = source_id;
        }
        if let Some(library_name) = update.library_name {
            merged.library_name = library_name;
        }
        if let Some(library_template) = update.library_template {
            merged.library_template = library_template;
        }
        if let Some(rename_default) = update.rename_on_save_default {
            merged.rename_on_save_default = rename_default;
        }
        if let Some(custom_fields) = update.custom_fields {
            validate_custom_field_defs(&custom_fields)?;
            merged.custom_fields = custom_fields;
        }

        persist(&self.path, &merged)?;
        *self.current.write().expect("settings lock poisoned") = merged.clone();
        Ok(merged)
    }
}

/// Validate custom field definitions: tag format, length, and no clashes
/// with built-in USER tags or each other.
pub fn validate_custom_field_defs(fields: &[CustomFieldDef]) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for field in fields {
        validate_custom_tag(&field.tag)?;
        if seen.contains(&field.tag.as_str()) {
            return Err(Error::Validation(format!(
                "Duplicate custom field tag '{}'",
                field.tag
            )));
        }
        seen.push(&field.tag);
    }
    Ok(())
}

/// Atomic persist: write to a temp file in the same directory, fsync,
/// rename over the target.
fn persist(path: &Path, settings: &AppSettings) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::Internal(format!("Settings encode failed: {}", e)))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".settings-")
        .suffix(".json.tmp")
        .tempfile_in(dir)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
