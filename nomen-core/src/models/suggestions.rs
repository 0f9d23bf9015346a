//! Per-field metadata suggestions, recomputed on every read

use serde::{Deserialize, Serialize};

/// Where a suggestion value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    /// Classifier ranking.
    Clap,
    /// Captioner text.
    Clapcap,
    /// Derived from taxonomy data (e.g. synonym keywords).
    Derived,
    /// Generated (e.g. assembled filename).
    Generated,
}

/// A single field suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub value: String,
    pub source: SuggestionSource,
    pub confidence: Option<f64>,
}

impl Suggestion {
    pub fn new(value: impl Into<String>, source: SuggestionSource, confidence: Option<f64>) -> Self {
        Self {
            value: value.into(),
            source,
            confidence,
        }
    }
}

/// Suggestions for one file. Never persisted — a pure function of the
/// cached analysis, the current settings, and the taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionsResult {
    pub category: Option<Suggestion>,
    pub subcategory: Option<Suggestion>,
    pub cat_id: Option<Suggestion>,
    pub category_full: Option<Suggestion>,
    pub fx_name: Option<Suggestion>,
    pub description: Option<Suggestion>,
    pub keywords: Option<Suggestion>,
    pub suggested_filename: Option<Suggestion>,
}

impl SuggestionsResult {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.subcategory.is_none()
            && self.cat_id.is_none()
            && self.category_full.is_none()
            && self.fx_name.is_none()
            && self.description.is_none()
            && self.keywords.is_none()
            && self.suggested_filename.is_none()
    }
}
