//! Shared test fixtures: synthesized WAV files, a small taxonomy, and a
//! fully wired repository with a stub classifier.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nomen_core::db;
use nomen_core::models::{ClassificationMatch, FileRecord};
use nomen_core::services::analyzer::{AnalyzeOptions, Classifier, ClassifierOutput, ModelGate};
use nomen_core::services::clock::SystemClock;
use nomen_core::services::settings::{SettingsStore, SettingsUpdate};
use nomen_core::services::FileRepository;
use nomen_core::ucs::engine::{CatInfo, UcsEngine};
use nomen_core::Result;

pub const FOURCC_FMT: [u8; 4] = *b"fmt ";
pub const FOURCC_DATA: [u8; 4] = *b"data";
pub const FOURCC_BEXT: [u8; 4] = *b"bext";
pub const FOURCC_IXML: [u8; 4] = *b"iXML";
pub const FOURCC_LIST: [u8; 4] = *b"LIST";

/// 48 kHz / 16-bit / mono PCM fmt payload.
pub fn fmt_payload() -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&48_000u32.to_le_bytes());
    fmt.extend_from_slice(&96_000u32.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());
    fmt
}

fn append_chunk(body: &mut Vec<u8>, fourcc: [u8; 4], payload: &[u8]) {
    body.extend_from_slice(&fourcc);
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(payload);
    if payload.len() % 2 != 0 {
        body.push(0);
    }
}

/// Assemble a complete RIFF/WAVE byte image from the given chunks.
pub fn build_wav_bytes(chunks: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();
    for (fourcc, payload) in chunks {
        append_chunk(&mut body, *fourcc, payload);
    }
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(&body);
    out
}

/// 200 ms of silence: fmt + data only.
pub fn write_bare_wav(path: &Path) {
    let bytes = build_wav_bytes(&[
        (FOURCC_FMT, fmt_payload()),
        (FOURCC_DATA, vec![0u8; 19_200]),
    ]);
    std::fs::write(path, bytes).unwrap();
}

/// Bare WAV plus arbitrary extra chunks between fmt and data.
pub fn write_wav_with_chunks(path: &Path, extra: &[([u8; 4], Vec<u8>)]) {
    let mut chunks: Vec<([u8; 4], Vec<u8>)> = vec![(FOURCC_FMT, fmt_payload())];
    chunks.extend(extra.iter().cloned());
    chunks.push((FOURCC_DATA, vec![0u8; 19_200]));
    std::fs::write(path, build_wav_bytes(&chunks)).unwrap();
}

/// LIST-INFO payload holding the given sub-chunks (values get the NUL
/// terminator appended).
pub fn info_list_payload(entries: &[(&[u8; 4], &str)]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"INFO");
    for (tag, value) in entries {
        let mut raw = value.as_bytes().to_vec();
        raw.push(0);
        payload.extend_from_slice(*tag);
        payload.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        payload.extend_from_slice(&raw);
        if raw.len() % 2 != 0 {
            payload.push(0);
        }
    }
    payload
}

fn row(cat_id: &str, category: &str, subcategory: &str, synonyms: &[&str]) -> CatInfo {
    CatInfo {
        cat_id: cat_id.to_string(),
        category: category.to_string(),
        subcategory: subcategory.to_string(),
        cat_short: category[..4.min(category.len())].to_string(),
        explanation: format!("{} sounds", subcategory.to_lowercase()),
        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
    }
}

/// Small taxonomy covering the door/wind cases the tests exercise.
pub fn sample_engine() -> UcsEngine {
    UcsEngine::from_rows(
        vec![
            row("DOORWood", "DOORS", "WOOD", &["timber", "plank", "wooden door"]),
            row("DOORCreak", "DOORS", "CREAK", &["creak", "squeak", "hinge"]),
            row("DOORMetal", "DOORS", "METAL", &["steel", "iron gate"]),
            row("WINDGust", "WIND", "GUST", &["gust", "blustery"]),
            row("AMBForest", "AMBIENCE", "FOREST", &["woodland", "birdsong"]),
        ],
        HashMap::new(),
    )
}

/// Scripted classifier: returns a fixed ranking, or an analysis failure.
pub struct StubClassifier {
    pub output: Vec<ClassificationMatch>,
    pub caption: Option<String>,
    pub fail: bool,
}

impl StubClassifier {
    pub fn ranking(hits: &[(&str, f64)]) -> Self {
        let engine = sample_engine();
        let output = hits
            .iter()
            .map(|(cat_id, confidence)| {
                let info = engine.get_catid_info(cat_id).expect("stub CatID in taxonomy");
                ClassificationMatch {
                    cat_id: info.cat_id.clone(),
                    category: info.category.clone(),
                    subcategory: info.subcategory.clone(),
                    category_full: info.category_full(),
                    confidence: *confidence,
                }
            })
            .collect();
        Self {
            output,
            caption: None,
            fail: false,
        }
    }

    pub fn with_caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            output: Vec::new(),
            caption: None,
            fail: true,
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn analyze(&self, _wav_path: &Path, options: &AnalyzeOptions) -> Result<ClassifierOutput> {
        if self.fail {
            return Err(nomen_core::Error::AnalysisFailed("stub failure".to_string()));
        }
        Ok(ClassifierOutput {
            classification: self.output.clone(),
            caption: if options.with_caption {
                self.caption.clone()
            } else {
                None
            },
            model_version: "2023".to_string(),
        })
    }
}

/// A repository plus the handles tests poke at.
pub struct TestRig {
    pub repo: FileRepository,
    pub settings: Arc<SettingsStore>,
    pub gate: Arc<ModelGate>,
    pub db_path: PathBuf,
}

/// Wire a repository against a temp-dir database and settings file.
pub async fn make_rig(data_dir: &Path, classifier: StubClassifier) -> TestRig {
    let pool = db::init_database_pool(&data_dir.join("nomen.db")).await.unwrap();
    let settings = Arc::new(SettingsStore::load(data_dir.join("settings.json")).unwrap());
    let gate = Arc::new(ModelGate::ready());
    let repo = FileRepository::new(
        pool,
        Arc::new(sample_engine()),
        settings.clone(),
        Arc::new(classifier),
        gate.clone(),
        Arc::new(SystemClock),
    );
    TestRig {
        repo,
        settings,
        gate,
        db_path: data_dir.join("nomen.db"),
    }
}

pub fn set_ids(settings: &SettingsStore, creator: &str, source: &str) {
    settings
        .update(SettingsUpdate {
            creator_id: Some(creator.to_string()),
            source_id: Some(source.to_string()),
            ..Default::default()
        })
        .unwrap();
}

/// Import a single directory and return its records sorted by path.
pub async fn import_dir(repo: &FileRepository, dir: &Path) -> Vec<FileRecord> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let outcome = repo.import(dir, true, &cancel).await.unwrap();
    assert!(outcome.skipped_paths.is_empty(), "unexpected skips: {:?}", outcome.skipped_paths);
    outcome.files
}
