//! Suggestion recomputation.
//!
//! Suggestions are never persisted: every read derives them again from
//! the cached analysis, the current settings, and the taxonomy, so
//! proposals track configuration changes and renames without migrations.

use std::collections::HashMap;

use crate::models::{
    AnalysisResult, ClassificationMatch, Suggestion, SuggestionSource, SuggestionsResult,
};
use crate::services::settings::AppSettings;
use crate::ucs::engine::UcsEngine;
use crate::ucs::filename::{fuzzy_match, generate_filename, FilenameParts};

/// Weight of the filename keyword evidence in the blended ranking. At
/// alpha=10 keyword hits dominate, with classifier confidence as the
/// acoustic tiebreaker among keyword-matched candidates.
const FILENAME_ALPHA: f64 = 10.0;

const EPSILON: f64 = 1e-9;

/// Fuzzy candidates consulted for the boost; matches the analysis cache
/// depth so re-ranking can pull CatIDs from deep ranks.
const FUZZY_CANDIDATES: usize = 50;

/// Synonyms emitted as keyword suggestions.
const KEYWORD_COUNT: usize = 10;

/// Length cap for the caption-derived FXName.
const FX_NAME_MAX_LEN: usize = 25;

/// Filler words ignored when extracting an FXName from a caption.
const ARTICLES: &[&str] = &["a", "an", "the", "of", "in", "on", "at", "to", "is", "and"];

/// Recompute per-field suggestions for one file.
///
/// Classifier confidences blend with normalized filename-keyword scores in
/// log space: `softmax(ln(c + eps) + alpha * k)`. The top-ranked CatID
/// drives the category suggestions; the caption (when present) supplies
/// description and FXName.
pub fn recompute(
    engine: &UcsEngine,
    settings: &AppSettings,
    filename: &str,
    analysis: Option<&AnalysisResult>,
) -> Option<SuggestionsResult> {
    let analysis = analysis?;
    if analysis.classification.is_empty() {
        return None;
    }

    let (top, confidence) = rank_hits(engine, filename, &analysis.classification);

    // Re-derive the category tuple from the taxonomy; fall back to the
    // classifier's own copy when the CatID is no longer known.
    let (category, subcategory, category_full) = match engine.get_catid_info(&top.cat_id) {
        Some(info) => (info.category.clone(), info.subcategory.clone(), info.category_full()),
        None => {
            tracing::warn!(cat_id = %top.cat_id, "Analysis references unknown CatID");
            (top.category.clone(), top.subcategory.clone(), top.category_full.clone())
        }
    };

    let clap = |value: String| Suggestion::new(value, SuggestionSource::Clap, Some(confidence));

    let mut result = SuggestionsResult {
        category: Some(clap(category)),
        subcategory: Some(clap(subcategory)),
        cat_id: Some(clap(top.cat_id.clone())),
        category_full: Some(clap(category_full)),
        ..Default::default()
    };

    let synonyms = engine.get_synonyms(&top.cat_id);
    if !synonyms.is_empty() {
        let keywords = synonyms
            .iter()
            .take(KEYWORD_COUNT)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        result.keywords = Some(Suggestion::new(keywords, SuggestionSource::Derived, None));
    }

    let mut fx_name_text: Option<String> = None;
    if let Some(caption) = analysis.caption.as_deref() {
        let cleaned = clean_caption(caption);
        if !cleaned.is_empty() {
            result.description =
                Some(Suggestion::new(cleaned, SuggestionSource::Clapcap, None));
        }
        let extracted = extract_fx_name(caption);
        if !extracted.is_empty() {
            result.fx_name = Some(Suggestion::new(
                extracted.clone(),
                SuggestionSource::Clapcap,
                None,
            ));
            fx_name_text = Some(extracted);
        }
    }

    let generated = generate_filename(
        engine,
        &FilenameParts {
            cat_id: &top.cat_id,
            fx_name: fx_name_text.as_deref(),
            ..Default::default()
        },
        settings,
    );
    if generated.valid {
        result.suggested_filename = Some(Suggestion::new(
            generated.filename,
            SuggestionSource::Generated,
            None,
        ));
    }

    Some(result)
}

/// Blend classifier confidence with the filename keyword boost and return
/// the winning hit plus its softmax probability.
fn rank_hits<'a>(
    engine: &UcsEngine,
    filename: &str,
    hits: &'a [ClassificationMatch],
) -> (&'a ClassificationMatch, f64) {
    let matches = fuzzy_match(engine, filename, FUZZY_CANDIDATES);
    let max_score = matches.first().map(|m| m.score).unwrap_or(0);
    let boost: HashMap<&str, f64> = if max_score > 0 {
        matches
            .iter()
            .map(|m| (m.cat_id.as_str(), m.score as f64 / max_score as f64))
            .collect()
    } else {
        HashMap::new()
    };

    let logits: Vec<f64> = hits
        .iter()
        .map(|hit| {
            (hit.confidence + EPSILON).ln()
                + FILENAME_ALPHA * boost.get(hit.cat_id.as_str()).copied().unwrap_or(0.0)
        })
        .collect();

    // Numerically stable softmax
    let max_logit = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max_logit).exp()).collect();
    let total: f64 = exps.iter().sum();

    let mut best = 0usize;
    for (i, value) in exps.iter().enumerate() {
        if *value > exps[best] {
            best = i;
        }
    }
    (&hits[best], exps[best] / total)
}

/// Clean a raw caption: collapse whitespace, capitalize the first letter,
/// strip one trailing period.
fn clean_caption(caption: &str) -> String {
    let collapsed = caption.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.strip_suffix('.').unwrap_or(&collapsed);
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Extract a short FXName from a caption: title-cased non-filler words
/// accumulated up to the length cap.
fn extract_fx_name(caption: &str) -> String {
    let mut out = String::new();
    for word in caption
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
    {
        if ARTICLES.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        let capitalized = capitalize(word);
        let extra = capitalized.len() + if out.is_empty() { 0 } else { 1 };
        if out.len() + extra > FX_NAME_MAX_LEN {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&capitalized);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucs::engine::CatInfo;

    fn engine() -> UcsEngine {
        UcsEngine::from_rows(
            vec![
                CatInfo {
                    cat_id: "DOORWood".into(),
                    category: "DOORS".into(),
                    subcategory: "WOOD".into(),
                    cat_short: "DOOR".into(),
                    explanation: "Wooden doors".into(),
                    synonyms: vec![
                        "timber".into(),
                        "plank".into(),
                        "slam".into(),
                        "wooden door".into(),
                    ],
                },
                CatInfo {
                    cat_id: "WINDGust".into(),
                    category: "WIND".into(),
                    subcategory: "GUST".into(),
                    cat_short: "WIND".into(),
                    explanation: "Wind gusts".into(),
                    synonyms: vec!["gust".into(), "blustery".into()],
                },
            ],
            Default::default(),
        )
    }

    fn hit(cat_id: &str, category: &str, subcategory: &str, confidence: f64) -> ClassificationMatch {
        ClassificationMatch {
            cat_id: cat_id.into(),
            category: category.into(),
            subcategory: subcategory.into(),
            category_full: format!("{}-{}", category, subcategory),
            confidence,
        }
    }

    fn analysis(hits: Vec<ClassificationMatch>, caption: Option<&str>) -> AnalysisResult {
        AnalysisResult {
            classification: hits,
            caption: caption.map(|s| s.to_string()),
            model_version: "2023".into(),
            analyzed_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn no_analysis_means_no_suggestions() {
        let engine = engine();
        let settings = AppSettings::default();
        assert!(recompute(&engine, &settings, "a.wav", None).is_none());
        let empty = analysis(vec![], None);
        assert!(recompute(&engine, &settings, "a.wav", Some(&empty)).is_none());
    }

    #[test]
    fn top_classifier_hit_wins_without_filename_evidence() {
        let engine = engine();
        let settings = AppSettings::default();
        let a = analysis(
            vec![
                hit("WINDGust", "WIND", "GUST", 0.7),
                hit("DOORWood", "DOORS", "WOOD", 0.3),
            ],
            None,
        );
        let result = recompute(&engine, &settings, "recording_0001.wav", Some(&a)).unwrap();
        assert_eq!(result.cat_id.as_ref().unwrap().value, "WINDGust");
        assert_eq!(result.category.as_ref().unwrap().value, "WIND");
        assert_eq!(result.category.as_ref().unwrap().source, SuggestionSource::Clap);
        let confidence = result.cat_id.as_ref().unwrap().confidence.unwrap();
        assert!(confidence > 0.5 && confidence <= 1.0);
    }

    #[test]
    fn filename_keywords_outrank_classifier_confidence() {
        let engine = engine();
        let settings = AppSettings::default();
        // Classifier prefers wind, but the filename screams wooden door.
        let a = analysis(
            vec![
                hit("WINDGust", "WIND", "GUST", 0.7),
                hit("DOORWood", "DOORS", "WOOD", 0.1),
            ],
            None,
        );
        let result =
            recompute(&engine, &settings, "timber_door_slam_take1.wav", Some(&a)).unwrap();
        assert_eq!(result.cat_id.as_ref().unwrap().value, "DOORWood");
    }

    #[test]
    fn keywords_come_from_synonyms() {
        let engine = engine();
        let settings = AppSettings::default();
        let a = analysis(vec![hit("DOORWood", "DOORS", "WOOD", 0.9)], None);
        let result = recompute(&engine, &settings, "x.wav", Some(&a)).unwrap();
        let keywords = result.keywords.unwrap();
        assert_eq!(keywords.value, "timber, plank, slam, wooden door");
        assert_eq!(keywords.source, SuggestionSource::Derived);
        assert_eq!(keywords.confidence, None);
    }

    #[test]
    fn caption_feeds_description_and_fx_name() {
        let engine = engine();
        let settings = AppSettings {
            creator_id: "JDOE".into(),
            source_id: "MYLIB".into(),
            ..Default::default()
        };
        let a = analysis(
            vec![hit("DOORWood", "DOORS", "WOOD", 0.9)],
            Some("a heavy   wooden door slams shut."),
        );
        let result = recompute(&engine, &settings, "x.wav", Some(&a)).unwrap();

        let description = result.description.unwrap();
        assert_eq!(description.value, "A heavy wooden door slams shut");
        assert_eq!(description.source, SuggestionSource::Clapcap);

        let fx_name = result.fx_name.unwrap();
        assert!(fx_name.value.len() <= FX_NAME_MAX_LEN);
        assert!(fx_name.value.starts_with("Heavy Wooden Door"));

        let filename = result.suggested_filename.unwrap();
        assert_eq!(filename.source, SuggestionSource::Generated);
        assert!(filename.value.starts_with("DOORWood_"));
        assert!(filename.value.contains("_JDOE_MYLIB"));
        assert!(filename.value.ends_with(".wav"));
    }

    #[test]
    fn settings_changes_show_up_without_reanalysis() {
        let engine = engine();
        let a = analysis(vec![hit("DOORWood", "DOORS", "WOOD", 0.9)], None);

        let before = recompute(&engine, &AppSettings::default(), "x.wav", Some(&a)).unwrap();
        assert!(!before
            .suggested_filename
            .as_ref()
            .unwrap()
            .value
            .contains("NEWID"));

        let updated = AppSettings {
            creator_id: "NEWID".into(),
            ..Default::default()
        };
        let after = recompute(&engine, &updated, "x.wav", Some(&a)).unwrap();
        assert!(after.suggested_filename.unwrap().value.contains("NEWID"));
    }

    #[test]
    fn caption_cleanup_rules() {
        assert_eq!(clean_caption("  a door   slams. "), "A door slams");
        assert_eq!(clean_caption("already Clean"), "Already Clean");
        assert_eq!(clean_caption(""), "");
    }

    #[test]
    fn fx_name_extraction_respects_cap_and_articles() {
        assert_eq!(extract_fx_name("a door slams"), "Door Slams");
        assert_eq!(extract_fx_name(""), "");
        let long = extract_fx_name("the quick brown fox jumps over the lazy dog repeatedly");
        assert!(long.len() <= FX_NAME_MAX_LEN);
        assert!(!long.is_empty());
    }
}
