//! UCS filename codec — tokenizer, fuzzy matching, parser, generator.
//!
//! A UCS-compliant stem is laid out as
//! `CatID[-UserCategory]_[VendorCategory-]FXName_CreatorID_SourceID[_UserData]`
//! with `_` as the only block separator.

use crate::services::settings::AppSettings;
use crate::ucs::engine::UcsEngine;

/// A candidate UCS match for a non-UCS filename.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub cat_id: String,
    pub category: String,
    pub subcategory: String,
    pub score: u32,
    pub matched_terms: Vec<String>,
}

/// Result of parsing a filename against the UCS convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFilename {
    pub is_ucs_compliant: bool,
    pub cat_id: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub category_full: Option<String>,
    pub user_category: Option<String>,
    pub fx_name: Option<String>,
    pub vendor_category: Option<String>,
    pub creator_id: Option<String>,
    pub source_id: Option<String>,
    pub user_data: Option<String>,
    pub fuzzy_matches: Vec<FuzzyMatch>,
    pub raw_tokens: Vec<String>,
}

/// Result of generating a UCS-compliant filename.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFilename {
    pub filename: String,
    pub valid: bool,
    pub warnings: Vec<String>,
}

/// Fields feeding filename generation.
#[derive(Debug, Clone, Default)]
pub struct FilenameParts<'a> {
    pub cat_id: &'a str,
    pub fx_name: Option<&'a str>,
    pub creator_id: Option<&'a str>,
    pub source_id: Option<&'a str>,
    pub user_category: Option<&'a str>,
    pub user_data: Option<&'a str>,
}

/// Default number of fuzzy candidates returned.
pub const FUZZY_TOP_N: usize = 5;

/// Conservative stem length cap, leaving headroom for OS path limits.
const MAX_STEM_LEN: usize = 120;

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split a filename into lowercase tokens: strip the `.wav` extension,
/// break camelCase boundaries, split on `_ - space`, deduplicate, drop
/// tokens shorter than 3 characters.
pub fn tokenize(name: &str) -> Vec<String> {
    let stem = strip_wav_extension(name);

    let mut broken = String::with_capacity(stem.len() + 8);
    let chars: Vec<char> = stem.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1);
            // aB boundary, or ABc boundary (acronym followed by word)
            let camel = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.map(|n| n.is_lowercase()).unwrap_or(false));
            if camel {
                broken.push('_');
            }
        }
        broken.push(c);
    }

    let mut seen: Vec<String> = Vec::new();
    for part in broken.split(|c: char| c == '_' || c == '-' || c.is_whitespace()) {
        let low = part.to_lowercase();
        if low.len() >= 3 && !seen.contains(&low) {
            seen.push(low);
        }
    }
    seen
}

fn strip_wav_extension(name: &str) -> &str {
    if name.len() >= 4 && name[name.len() - 4..].eq_ignore_ascii_case(".wav") {
        &name[..name.len() - 4]
    } else {
        name
    }
}

// ---------------------------------------------------------------------------
// Fuzzy matching
// ---------------------------------------------------------------------------

/// Score every CatID by synonym/name token overlap and return the top N.
///
/// Score = number of distinct tokens hitting the CatID, plus one bonus per
/// token that prefix-matches its category name. Ties break on
/// lexicographic CatID.
pub fn fuzzy_match(engine: &UcsEngine, filename: &str, top_n: usize) -> Vec<FuzzyMatch> {
    let tokens = tokenize(filename);
    if tokens.is_empty() {
        return Vec::new();
    }

    // cat_id → (matched tokens, category-name bonus)
    let mut scores: std::collections::HashMap<String, (Vec<String>, u32)> =
        std::collections::HashMap::new();

    for token in &tokens {
        for cid in engine.synonym_hits(token) {
            let entry = scores.entry(cid.to_string()).or_default();
            if !entry.0.contains(token) {
                entry.0.push(token.clone());
            }
        }
        match_category_names(engine, token, &mut scores);
    }

    let mut results: Vec<FuzzyMatch> = scores
        .into_iter()
        .filter_map(|(cid, (mut matched, bonus))| {
            let info = engine.get_catid_info(&cid)?;
            matched.sort();
            Some(FuzzyMatch {
                category: info.category.clone(),
                subcategory: info.subcategory.clone(),
                score: matched.len() as u32 + bonus,
                matched_terms: matched,
                cat_id: cid,
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.cat_id.cmp(&b.cat_id)));
    results.truncate(top_n);
    results
}

/// Record token hits against category/subcategory names (prefix-aware in
/// both directions). A category-name prefix hit also earns the bonus.
fn match_category_names(
    engine: &UcsEngine,
    token: &str,
    scores: &mut std::collections::HashMap<String, (Vec<String>, u32)>,
) {
    for cat in engine.list_categories() {
        let cat_low = cat.to_lowercase();
        let cat_match = cat_low.starts_with(token) || token.starts_with(cat_low.as_str());
        for sub in engine.list_subcategories(cat) {
            let sub_low = sub.to_lowercase();
            let sub_match = sub_low.starts_with(token) || token.starts_with(sub_low.as_str());
            if !cat_match && !sub_match {
                continue;
            }
            let Some(cid) = engine.lookup_catid(cat, sub) else {
                continue;
            };
            let entry = scores.entry(cid.to_string()).or_default();
            if !entry.0.contains(&token.to_string()) {
                entry.0.push(token.to_string());
            }
            if cat_match {
                entry.1 += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a filename per the UCS convention.
///
/// A stem with fewer than three `_`-separated blocks, or one whose first
/// block is not a known CatID, is non-compliant and comes back with fuzzy
/// candidates instead.
pub fn parse_filename(engine: &UcsEngine, filename: &str) -> ParsedFilename {
    let stem = strip_wav_extension(filename);
    let blocks: Vec<&str> = stem.split('_').collect();

    if blocks.len() < 3 {
        return non_ucs_result(engine, filename);
    }

    let (catid_candidate, user_category) = split_catid_block(blocks[0]);
    let Some(info) = engine.get_catid_info(catid_candidate) else {
        return non_ucs_result(engine, filename);
    };

    let n = blocks.len();
    let (fx_name, creator_id, source_id, user_data) = if n >= 5 {
        (
            Some(blocks[1..n - 3].join("_")),
            Some(blocks[n - 3].to_string()),
            Some(blocks[n - 2].to_string()),
            Some(blocks[n - 1].to_string()),
        )
    } else if n == 4 {
        (
            Some(blocks[1].to_string()),
            Some(blocks[2].to_string()),
            Some(blocks[3].to_string()),
            None,
        )
    } else {
        (Some(blocks[1].to_string()), Some(blocks[2].to_string()), None, None)
    };

    // VendorCategory is the text before the first '-' inside FXName.
    let vendor_category = fx_name
        .as_deref()
        .and_then(|fx| fx.split_once('-'))
        .map(|(vendor, _)| vendor.to_string());

    ParsedFilename {
        is_ucs_compliant: true,
        cat_id: Some(info.cat_id.clone()),
        category: Some(info.category.clone()),
        subcategory: Some(info.subcategory.clone()),
        category_full: Some(info.category_full()),
        user_category: user_category.map(|s| s.to_string()),
        fx_name,
        vendor_category,
        creator_id,
        source_id,
        user_data,
        ..Default::default()
    }
}

/// Split block 0 on the first `-` into (CatID candidate, UserCategory).
fn split_catid_block(block: &str) -> (&str, Option<&str>) {
    match block.split_once('-') {
        Some((catid, user)) if !user.is_empty() => (catid, Some(user)),
        Some((catid, _)) => (catid, None),
        None => (block, None),
    }
}

fn non_ucs_result(engine: &UcsEngine, filename: &str) -> ParsedFilename {
    ParsedFilename {
        is_ucs_compliant: false,
        fuzzy_matches: fuzzy_match(engine, filename, FUZZY_TOP_N),
        raw_tokens: tokenize(filename),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Assemble a UCS-compliant filename from metadata fields.
///
/// Missing creator/source fall back to the settings defaults; a missing
/// FXName becomes `"Untitled"`. Characters illegal on common filesystems
/// are stripped and the stem is truncated at [`MAX_STEM_LEN`] without ever
/// cutting into the CatID block.
pub fn generate_filename(
    engine: &UcsEngine,
    parts: &FilenameParts<'_>,
    settings: &AppSettings,
) -> GeneratedFilename {
    let mut warnings: Vec<String> = Vec::new();

    if engine.get_catid_info(parts.cat_id).is_none() {
        return GeneratedFilename {
            filename: format!("{}_Untitled.wav", sanitize(parts.cat_id)),
            valid: false,
            warnings: vec!["Invalid CatID".to_string()],
        };
    }

    let creator_id = parts
        .creator_id
        .filter(|s| !s.is_empty())
        .or(non_empty(&settings.creator_id));
    let source_id = parts
        .source_id
        .filter(|s| !s.is_empty())
        .or(non_empty(&settings.source_id));

    let catid_block = match parts.user_category.filter(|s| !s.is_empty()) {
        Some(user) => format!("{}-{}", parts.cat_id, user),
        None => parts.cat_id.to_string(),
    };

    let fx_name = match parts.fx_name.filter(|s| !s.is_empty()) {
        Some(fx) => {
            if fx.len() > 25 {
                warnings.push(format!("FXName exceeds 25 chars ({})", fx.len()));
            }
            fx.to_string()
        }
        None => {
            warnings.push("Missing fx_name, using 'Untitled'".to_string());
            "Untitled".to_string()
        }
    };

    if creator_id.is_none() {
        warnings.push("Missing creator_id".to_string());
    }
    if source_id.is_none() {
        warnings.push("Missing source_id".to_string());
    }

    let mut parts_out: Vec<String> = vec![catid_block.clone(), fx_name];
    if let Some(creator) = creator_id {
        parts_out.push(creator.to_string());
    }
    if let Some(source) = source_id {
        parts_out.push(source.to_string());
    }
    if let Some(user_data) = parts.user_data.filter(|s| !s.is_empty()) {
        parts_out.push(user_data.to_string());
    }

    let mut stem = sanitize(&parts_out.join("_"));
    if stem.len() > MAX_STEM_LEN {
        let keep = MAX_STEM_LEN.max(sanitize(&catid_block).len());
        stem = truncate_on_char_boundary(&stem, keep);
        warnings.push("Filename truncated".to_string());
    }

    GeneratedFilename {
        filename: format!("{}.wav", stem),
        valid: true,
        warnings,
    }
}

/// Render the library field from the settings template.
///
/// Substitutes `{source_id}` / `{library_name}` and collapses the extra
/// whitespace left by missing values.
pub fn render_library_template(
    template: &str,
    source_id: Option<&str>,
    library_name: Option<&str>,
) -> String {
    let rendered = template
        .replace("{source_id}", source_id.unwrap_or(""))
        .replace("{library_name}", library_name.unwrap_or(""));
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect()
}

fn truncate_on_char_boundary(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucs::engine::CatInfo;
    use std::collections::HashMap;

    fn engine() -> UcsEngine {
        UcsEngine::from_rows(
            vec![
                CatInfo {
                    cat_id: "DOORWood".into(),
                    category: "DOORS".into(),
                    subcategory: "WOOD".into(),
                    cat_short: "DOOR".into(),
                    explanation: "Wooden doors".into(),
                    synonyms: vec!["timber".into(), "plank".into()],
                },
                CatInfo {
                    cat_id: "DOORCreak".into(),
                    category: "DOORS".into(),
                    subcategory: "CREAK".into(),
                    cat_short: "DOOR".into(),
                    explanation: "Creaking doors".into(),
                    synonyms: vec!["creak".into(), "squeak".into()],
                },
                CatInfo {
                    cat_id: "WINDGust".into(),
                    category: "WIND".into(),
                    subcategory: "GUST".into(),
                    cat_short: "WIND".into(),
                    explanation: "Wind gusts".into(),
                    synonyms: vec!["gust".into()],
                },
            ],
            HashMap::new(),
        )
    }

    #[test]
    fn tokenizer_splits_camel_case_and_separators() {
        let tokens = tokenize("DOORWood_CabinDoor creak-01.wav");
        assert!(tokens.contains(&"door".to_string()));
        assert!(tokens.contains(&"wood".to_string()));
        assert!(tokens.contains(&"cabin".to_string()));
        assert!(tokens.contains(&"creak".to_string()));
        // "01" dropped (under 3 chars), "door" deduplicated
        assert!(!tokens.contains(&"01".to_string()));
        assert_eq!(tokens.iter().filter(|t| *t == "door").count(), 1);
    }

    #[test]
    fn parses_compliant_filename() {
        let engine = engine();
        let parsed = parse_filename(&engine, "DOORWood_Cabin Door Open_JDOE_MYLIB.wav");
        assert!(parsed.is_ucs_compliant);
        assert_eq!(parsed.cat_id.as_deref(), Some("DOORWood"));
        assert_eq!(parsed.category.as_deref(), Some("DOORS"));
        assert_eq!(parsed.category_full.as_deref(), Some("DOORS-WOOD"));
        assert_eq!(parsed.fx_name.as_deref(), Some("Cabin Door Open"));
        assert_eq!(parsed.creator_id.as_deref(), Some("JDOE"));
        assert_eq!(parsed.source_id.as_deref(), Some("MYLIB"));
        assert_eq!(parsed.user_data, None);
    }

    #[test]
    fn parses_user_category_and_user_data() {
        let engine = engine();
        let parsed =
            parse_filename(&engine, "DOORWood-Heavy_Slam_JDOE_MYLIB_TAKE2.wav");
        assert!(parsed.is_ucs_compliant);
        assert_eq!(parsed.user_category.as_deref(), Some("Heavy"));
        assert_eq!(parsed.fx_name.as_deref(), Some("Slam"));
        assert_eq!(parsed.user_data.as_deref(), Some("TAKE2"));
    }

    #[test]
    fn multiword_fxname_collapses_middle_blocks() {
        let engine = engine();
        let parsed = parse_filename(&engine, "DOORWood_Old_Cabin_Door_JDOE_MYLIB_V2.wav");
        assert_eq!(parsed.fx_name.as_deref(), Some("Old_Cabin_Door"));
        assert_eq!(parsed.creator_id.as_deref(), Some("JDOE"));
        assert_eq!(parsed.source_id.as_deref(), Some("MYLIB"));
        assert_eq!(parsed.user_data.as_deref(), Some("V2"));
    }

    #[test]
    fn vendor_category_extracted_from_fxname() {
        let engine = engine();
        let parsed = parse_filename(&engine, "DOORWood_ACME-Slam_JDOE_MYLIB.wav");
        assert_eq!(parsed.vendor_category.as_deref(), Some("ACME"));
    }

    #[test]
    fn short_stem_goes_fuzzy() {
        let engine = engine();
        let parsed = parse_filename(&engine, "DOORWood_Slam.wav");
        assert!(!parsed.is_ucs_compliant);
        assert!(!parsed.fuzzy_matches.is_empty());
    }

    #[test]
    fn unknown_catid_goes_fuzzy_with_both_candidates() {
        let engine = engine();
        let parsed = parse_filename(&engine, "timber_door_creak_mono.wav");
        assert!(!parsed.is_ucs_compliant);
        let ids: Vec<&str> = parsed
            .fuzzy_matches
            .iter()
            .map(|m| m.cat_id.as_str())
            .collect();
        assert!(ids.contains(&"DOORWood"));
        assert!(ids.contains(&"DOORCreak"));
        // DOORCreak hits "creak" (synonym) + "creak" prefix on subcategory;
        // "door" prefix-matches the DOORS category name for both.
        let creak = parsed.fuzzy_matches.iter().find(|m| m.cat_id == "DOORCreak").unwrap();
        let wood = parsed.fuzzy_matches.iter().find(|m| m.cat_id == "DOORWood").unwrap();
        assert!(creak.score >= wood.score);
    }

    #[test]
    fn fuzzy_ties_break_on_catid() {
        let engine = engine();
        // "door" alone hits DOORWood and DOORCreak identically via the
        // category name; the lexicographically smaller CatID comes first.
        let matches = fuzzy_match(&engine, "door.wav", 5);
        assert!(matches.len() >= 2);
        assert_eq!(matches[0].cat_id, "DOORCreak");
    }

    #[test]
    fn generates_with_settings_fallback() {
        let engine = engine();
        let settings = AppSettings {
            creator_id: "JDOE".into(),
            source_id: "MYLIB".into(),
            ..Default::default()
        };
        let parts = FilenameParts {
            cat_id: "DOORWood",
            fx_name: Some("Door Slam"),
            ..Default::default()
        };
        let generated = generate_filename(&engine, &parts, &settings);
        assert!(generated.valid);
        assert_eq!(generated.filename, "DOORWood_Door Slam_JDOE_MYLIB.wav");
    }

    #[test]
    fn generates_untitled_without_fxname() {
        let engine = engine();
        let settings = AppSettings::default();
        let parts = FilenameParts {
            cat_id: "DOORWood",
            ..Default::default()
        };
        let generated = generate_filename(&engine, &parts, &settings);
        assert!(generated.valid);
        assert_eq!(generated.filename, "DOORWood_Untitled.wav");
        assert!(generated.warnings.iter().any(|w| w.contains("Untitled")));
    }

    #[test]
    fn strips_illegal_characters() {
        let engine = engine();
        let settings = AppSettings::default();
        let parts = FilenameParts {
            cat_id: "DOORWood",
            fx_name: Some("Sl<a>m: \"heavy\"?"),
            creator_id: Some("JDOE"),
            source_id: Some("MYLIB"),
            ..Default::default()
        };
        let generated = generate_filename(&engine, &parts, &settings);
        assert!(!generated.filename.contains('<'));
        assert!(!generated.filename.contains(':'));
        assert!(!generated.filename.contains('?'));
        assert!(!generated.filename.contains('"'));
    }

    #[test]
    fn truncates_long_stem_outside_catid() {
        let engine = engine();
        let settings = AppSettings::default();
        let long_fx = "x".repeat(300);
        let parts = FilenameParts {
            cat_id: "DOORWood",
            fx_name: Some(&long_fx),
            creator_id: Some("JDOE"),
            source_id: Some("MYLIB"),
            ..Default::default()
        };
        let generated = generate_filename(&engine, &parts, &settings);
        let stem = generated.filename.strip_suffix(".wav").unwrap();
        assert!(stem.len() <= 120);
        assert!(stem.starts_with("DOORWood"));
    }

    #[test]
    fn parse_generate_round_trip() {
        let engine = engine();
        let settings = AppSettings::default();
        let parts = FilenameParts {
            cat_id: "WINDGust",
            fx_name: Some("Howling Gale"),
            creator_id: Some("ACME"),
            source_id: Some("FIELDLIB"),
            ..Default::default()
        };
        let generated = generate_filename(&engine, &parts, &settings);
        let parsed = parse_filename(&engine, &generated.filename);
        assert!(parsed.is_ucs_compliant);
        assert_eq!(parsed.cat_id.as_deref(), Some("WINDGust"));
        assert_eq!(parsed.fx_name.as_deref(), Some("Howling Gale"));
        assert_eq!(parsed.creator_id.as_deref(), Some("ACME"));
        assert_eq!(parsed.source_id.as_deref(), Some("FIELDLIB"));
    }

    #[test]
    fn library_template_rendering() {
        assert_eq!(
            render_library_template("{source_id} {library_name}", Some("MYLIB"), None),
            "MYLIB"
        );
        assert_eq!(
            render_library_template("{source_id} {library_name}", Some("A"), Some("B")),
            "A B"
        );
        assert_eq!(render_library_template("{source_id} {library_name}", None, None), "");
    }
}
