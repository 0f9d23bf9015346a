//! UCS taxonomy engine — loads the category sheets into lookup tables.
//!
//! The engine is constructed once at startup and shared read-only
//! (`Arc<UcsEngine>`). A load failure is fatal: lookups on a partial
//! taxonomy are never offered.

use nomen_common::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Full details for a single UCS CatID entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CatInfo {
    pub cat_id: String,
    pub category: String,
    pub subcategory: String,
    pub cat_short: String,
    pub explanation: String,
    pub synonyms: Vec<String>,
}

impl CatInfo {
    pub fn category_full(&self) -> String {
        format!("{}-{}", self.category, self.subcategory)
    }
}

/// Extra synonyms missing from the official sheets, keyed by CatID.
/// Appended to the index after the sheet-derived entries.
const EXTRA_SYNONYMS: &[(&str, &[&str])] = &[("GUNCano", &["cannon"])];

/// Minimum token length for prefix matches in [`UcsEngine::synonym_hits`].
const PREFIX_MIN_LEN: usize = 4;

/// In-memory taxonomy lookup tables.
pub struct UcsEngine {
    /// Categories in source insertion order.
    categories: Vec<String>,
    /// Subcategory names per category, in source order.
    subcategories: HashMap<String, Vec<String>>,
    by_catid: HashMap<String, CatInfo>,
    cat_sub_to_catid: HashMap<(String, String), String>,
    category_explanations: HashMap<String, String>,
    /// Lowercased synonym → CatIDs carrying it.
    synonym_index: HashMap<String, Vec<String>>,
}

impl UcsEngine {
    /// Load the taxonomy from the full-list sheet and the category
    /// overview sheet.
    pub fn load(full_list: &Path, category_overview: &Path) -> Result<Self> {
        let rows = parse_full_list(full_list)?;
        if rows.is_empty() {
            return Err(Error::Config(format!(
                "Taxonomy sheet has no data rows: {}",
                full_list.display()
            )));
        }
        let explanations = parse_category_overview(category_overview)?;
        let engine = Self::from_rows(rows, explanations);
        tracing::info!(
            categories = engine.categories.len(),
            subcategories = engine.by_catid.len(),
            "UCS taxonomy loaded"
        );
        Ok(engine)
    }

    /// Build an engine from already-parsed rows. Rows keep their order;
    /// the first occurrence of each category fixes the category order.
    pub fn from_rows(rows: Vec<CatInfo>, category_explanations: HashMap<String, String>) -> Self {
        let mut categories: Vec<String> = Vec::new();
        let mut subcategories: HashMap<String, Vec<String>> = HashMap::new();
        let mut by_catid: HashMap<String, CatInfo> = HashMap::new();
        let mut cat_sub_to_catid: HashMap<(String, String), String> = HashMap::new();
        let mut synonym_index: HashMap<String, Vec<String>> = HashMap::new();

        for row in rows {
            if !categories.contains(&row.category) {
                categories.push(row.category.clone());
            }
            subcategories
                .entry(row.category.clone())
                .or_default()
                .push(row.subcategory.clone());
            cat_sub_to_catid.insert(
                (row.category.clone(), row.subcategory.clone()),
                row.cat_id.clone(),
            );
            for syn in &row.synonyms {
                synonym_index
                    .entry(syn.to_lowercase())
                    .or_default()
                    .push(row.cat_id.clone());
            }
            by_catid.insert(row.cat_id.clone(), row);
        }

        for (cat_id, extras) in EXTRA_SYNONYMS {
            if by_catid.contains_key(*cat_id) {
                for syn in *extras {
                    synonym_index
                        .entry(syn.to_lowercase())
                        .or_default()
                        .push((*cat_id).to_string());
                }
            }
        }

        Self {
            categories,
            subcategories,
            by_catid,
            cat_sub_to_catid,
            category_explanations,
            synonym_index,
        }
    }

    /// Categories in source order.
    pub fn list_categories(&self) -> &[String] {
        &self.categories
    }

    /// Subcategories under a category, or empty for unknown categories.
    pub fn list_subcategories(&self, category: &str) -> &[String] {
        self.subcategories
            .get(category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a `(category, subcategory)` pair to its CatID.
    pub fn lookup_catid(&self, category: &str, subcategory: &str) -> Option<&str> {
        self.cat_sub_to_catid
            .get(&(category.to_string(), subcategory.to_string()))
            .map(|s| s.as_str())
    }

    /// Full record for a CatID.
    pub fn get_catid_info(&self, cat_id: &str) -> Option<&CatInfo> {
        self.by_catid.get(cat_id)
    }

    pub fn get_category_explanation(&self, category: &str) -> Option<&str> {
        self.category_explanations.get(category).map(|s| s.as_str())
    }

    /// Synonyms for a CatID, or empty if unknown.
    pub fn get_synonyms(&self, cat_id: &str) -> &[String] {
        self.by_catid
            .get(cat_id)
            .map(|i| i.synonyms.as_slice())
            .unwrap_or(&[])
    }

    /// All taxonomy entries, unordered.
    pub fn all_entries(&self) -> impl Iterator<Item = &CatInfo> {
        self.by_catid.values()
    }

    /// CatIDs whose synonyms match a lowercased token.
    ///
    /// Prefix-aware: a token matches a synonym when it equals the synonym,
    /// or the synonym starts with the token and the token has at least
    /// four characters.
    pub fn synonym_hits(&self, token: &str) -> BTreeSet<&str> {
        let mut hits: BTreeSet<&str> = BTreeSet::new();
        if let Some(cat_ids) = self.synonym_index.get(token) {
            hits.extend(cat_ids.iter().map(|s| s.as_str()));
        }
        if token.len() >= PREFIX_MIN_LEN {
            for (syn, cat_ids) in &self.synonym_index {
                if syn.starts_with(token) && syn != token {
                    hits.extend(cat_ids.iter().map(|s| s.as_str()));
                }
            }
        }
        hits
    }
}

// ---------------------------------------------------------------------------
// Sheet parsing
// ---------------------------------------------------------------------------

fn normalize_header(cell: &str) -> String {
    cell.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Locate required columns in a header row. Returns column indexes for
/// (category, subcategory, catid, catshort, explanation, synonyms).
fn resolve_full_list_header(record: &csv::StringRecord) -> Option<[usize; 6]> {
    let mut cols = [usize::MAX; 6];
    for (idx, cell) in record.iter().enumerate() {
        match normalize_header(cell).as_str() {
            "category" => cols[0] = idx,
            "subcategory" => cols[1] = idx,
            "catid" => cols[2] = idx,
            "catshort" => cols[3] = idx,
            "explanation" | "explanations" => cols[4] = idx,
            "synonyms" | "synonym" => cols[5] = idx,
            _ => {}
        }
    }
    // CatShort/Explanation/Synonyms are tolerated missing; the first three
    // are required to identify the header row.
    if cols[0] != usize::MAX && cols[1] != usize::MAX && cols[2] != usize::MAX {
        Some(cols)
    } else {
        None
    }
}

fn parse_full_list(path: &Path) -> Result<Vec<CatInfo>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Config(format!("Cannot open taxonomy sheet {}: {}", path.display(), e)))?;

    let mut cols: Option<[usize; 6]> = None;
    let mut rows: Vec<CatInfo> = Vec::new();

    for record in reader.records() {
        let record =
            record.map_err(|e| Error::Config(format!("Malformed taxonomy row: {}", e)))?;

        let resolved = match cols {
            Some(resolved) => resolved,
            None => {
                cols = resolve_full_list_header(&record);
                continue;
            }
        };

        let cell = |i: usize| -> &str {
            if resolved[i] == usize::MAX {
                ""
            } else {
                record.get(resolved[i]).unwrap_or("").trim()
            }
        };

        let category = cell(0);
        if category.is_empty() {
            break;
        }

        rows.push(CatInfo {
            category: category.to_string(),
            subcategory: cell(1).to_string(),
            cat_id: cell(2).to_string(),
            cat_short: cell(3).to_string(),
            explanation: cell(4).to_string(),
            synonyms: parse_synonyms(cell(5)),
        });
    }

    if cols.is_none() {
        return Err(Error::Config(format!(
            "No header row found in taxonomy sheet: {}",
            path.display()
        )));
    }
    Ok(rows)
}

fn parse_category_overview(path: &Path) -> Result<HashMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Config(format!("Cannot open category sheet {}: {}", path.display(), e)))?;

    let mut cols: Option<(usize, usize)> = None;
    let mut explanations = HashMap::new();

    for record in reader.records() {
        let record =
            record.map_err(|e| Error::Config(format!("Malformed category row: {}", e)))?;

        let Some((cat_col, exp_col)) = cols else {
            let mut cat = None;
            let mut exp = None;
            for (idx, cell) in record.iter().enumerate() {
                match normalize_header(cell).as_str() {
                    "category" => cat = Some(idx),
                    "explanation" | "explanations" => exp = Some(idx),
                    _ => {}
                }
            }
            if let (Some(c), Some(e)) = (cat, exp) {
                cols = Some((c, e));
            }
            continue;
        };

        let category = record.get(cat_col).unwrap_or("").trim();
        if category.is_empty() {
            break;
        }
        let explanation = record.get(exp_col).unwrap_or("").trim();
        explanations.insert(category.to_string(), explanation.to_string());
    }

    Ok(explanations)
}

/// Split a comma-separated synonym cell into a clean list.
fn parse_synonyms(raw: &str) -> Vec<String> {
    if raw.is_empty() || raw == "None" {
        return Vec::new();
    }
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
