//! NomenAudio core library
//!
//! Ingests broadcast-WAV files, edits their embedded metadata against the
//! Universal Category System taxonomy, and rewrites the files atomically
//! while preserving every unrelated chunk byte-for-byte.
//!
//! Subsystems:
//! - [`ucs`] — taxonomy engine and UCS filename codec
//! - [`wav`] — RIFF chunk reader/writer (bext, iXML, LIST-INFO)
//! - [`db`] — embedded SQLite store for file records and analysis cache
//! - [`services`] — repository, settings, suggestion recomputation,
//!   classifier interface

pub mod db;
pub mod models;
pub mod services;
pub mod ucs;
pub mod wav;

pub use nomen_common::{Error, Result};
pub use services::repository::FileRepository;

use std::sync::Arc;

use nomen_common::paths::DataPaths;
use services::analyzer::{Classifier, ModelGate};
use services::clock::SystemClock;
use services::settings::SettingsStore;
use ucs::engine::UcsEngine;

/// Wire up the whole core from resolved data paths.
///
/// Startup-time failures (taxonomy load, settings parse, database open)
/// are fatal: the repository never comes up on a partial core.
pub async fn initialize(
    paths: &DataPaths,
    classifier: Arc<dyn Classifier>,
    model_gate: Arc<ModelGate>,
) -> Result<FileRepository> {
    let ucs = UcsEngine::load(&paths.ucs_full_list(), &paths.ucs_category_overview())?;
    let settings = SettingsStore::load(paths.settings_path())?;
    let db = db::init_database_pool(&paths.db_path()).await?;

    Ok(FileRepository::new(
        db,
        Arc::new(ucs),
        Arc::new(settings),
        classifier,
        model_gate,
        Arc::new(SystemClock),
    ))
}
