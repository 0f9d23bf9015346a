//! Flagging rule — marks files whose analysis needs human review.

use crate::models::ClassificationMatch;

/// Analyzed files whose top confidence falls below this get flagged.
pub const FLAGGED_THRESHOLD: f64 = 0.3;

/// A file is flagged when it has been analyzed but either has no category
/// set, or the top classification confidence is below the threshold.
pub fn should_flag(classification: Option<&[ClassificationMatch]>, category: Option<&str>) -> bool {
    let Some(classification) = classification.filter(|c| !c.is_empty()) else {
        return false;
    };

    match category {
        None | Some("") => true,
        Some(_) => classification[0].confidence < FLAGGED_THRESHOLD,
    }
}
