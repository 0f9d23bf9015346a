//! File repository — the single owner of the embedded store.
//!
//! Serializes all mutations per file id, runs every disk access on the
//! blocking pool, and recomputes suggestions on each read so they track
//! the current settings without being persisted.

use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use nomen_common::{Error, Result};

use crate::db::files::{self, ListFilter};
use crate::db::analysis_cache;
use crate::models::{
    AnalysisResult, BatchAnalyzeOutcome, BatchAnalyzeResult, BatchSaveOutcome, BatchSaveResult,
    FileRecord, FileStatus, ImportOutcome, MetadataPatch, SaveOutcome, METADATA_FIELDS,
};
use crate::services::analyzer::{AnalyzeOptions, Classifier, ModelGate};
use crate::services::clock::Clock;
use crate::services::flagging::should_flag;
use crate::services::settings::SettingsStore;
use crate::services::suggestions;
use crate::ucs::engine::UcsEngine;
use crate::ucs::filename::{generate_filename, FilenameParts};
use crate::wav::ixml::validate_custom_tag;
use crate::wav::reader::{apply_import_fallbacks, compute_file_hash, read_metadata};
use crate::wav::writer::{write_metadata, MetadataWriteSet};

/// Fields whose edits invalidate the generated filename.
const FILENAME_FIELDS: &[&str] = &["cat_id", "fx_name", "creator_id", "source_id", "user_category"];

/// Options for a single save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Rename to `suggested_filename` after the write.
    pub rename: bool,
    /// Write into a copy at this path instead of the original.
    pub copy_path: Option<PathBuf>,
}

pub struct FileRepository {
    db: SqlitePool,
    ucs: Arc<UcsEngine>,
    settings: Arc<SettingsStore>,
    classifier: Arc<dyn Classifier>,
    model_gate: Arc<ModelGate>,
    clock: Arc<dyn Clock>,
    id_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl FileRepository {
    pub fn new(
        db: SqlitePool,
        ucs: Arc<UcsEngine>,
        settings: Arc<SettingsStore>,
        classifier: Arc<dyn Classifier>,
        model_gate: Arc<ModelGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            ucs,
            settings,
            classifier,
            model_gate,
            clock,
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Per-id lock: all mutations of one record are totally ordered.
    async fn id_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut map = self.id_locks.lock().await;
        map.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn hydrate(&self, mut record: FileRecord) -> FileRecord {
        let settings = self.settings.get();
        let result = suggestions::recompute(
            &self.ucs,
            &settings,
            &record.filename,
            record.analysis.as_ref(),
        );
        record.suggestions = result.filter(|r| !r.is_empty());
        record
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Scan a directory for WAV files, read their metadata, and upsert
    /// records. Unreadable files are collected, not fatal. Records whose
    /// backing file vanished from the scanned directory are removed.
    pub async fn import(
        &self,
        directory: &Path,
        recursive: bool,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome> {
        if !directory.is_dir() {
            return Err(Error::Validation(format!(
                "Not a directory: {}",
                directory.display()
            )));
        }
        let start = Instant::now();

        let scan_root = directory.to_path_buf();
        let wav_paths = tokio::task::spawn_blocking(move || scan_wav_files(&scan_root, recursive))
            .await
            .map_err(|e| Error::Internal(format!("Scan task failed: {}", e)))?;

        let mut records: Vec<FileRecord> = Vec::new();
        let mut skipped_paths: Vec<String> = Vec::new();
        let mut seen_paths: HashSet<String> = HashSet::new();
        let mut cancelled = false;

        for wav_path in wav_paths {
            if cancel.is_cancelled() {
                tracing::info!("Import cancelled, stopping at next file boundary");
                cancelled = true;
                break;
            }
            let abs = std::fs::canonicalize(&wav_path).unwrap_or_else(|_| wav_path.clone());
            let abs_str = abs.display().to_string();
            seen_paths.insert(abs_str.clone());

            match self.import_single(&abs).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %abs_str, error = %err, "Skipping unreadable file");
                    skipped_paths.push(abs_str);
                }
            }
        }

        if !cancelled {
            self.remove_stale_records(directory, &seen_paths).await?;
        }

        Ok(ImportOutcome {
            count: records.len(),
            files: records,
            skipped: skipped_paths.len(),
            skipped_paths,
            import_time_ms: start.elapsed().as_millis() as u64,
            cancelled,
        })
    }

    async fn import_single(&self, path: &Path) -> Result<FileRecord> {
        let hash = self.hash_file(path).await?;

        let path_str = path.display().to_string();
        if let Some(existing) = files::get_file_by_path(&self.db, &path_str).await? {
            if existing.file_hash == hash {
                // Unchanged since last read; the stored record is current.
                return Ok(self.hydrate(existing));
            }
        }

        let read_path = path.to_path_buf();
        let mut meta = tokio::task::spawn_blocking(move || {
            let mut meta = read_metadata(&read_path)?;
            apply_import_fallbacks(&mut meta);
            Ok::<_, Error>(meta)
        })
        .await
        .map_err(|e| Error::Internal(format!("Read task failed: {}", e)))??;

        let settings = self.settings.get();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        warn_on_unknown_catid(&self.ucs, &meta.fields.cat_id, &path_str);

        let mut record = FileRecord {
            id: Uuid::new_v4(),
            path: path_str,
            filename,
            directory,
            status: FileStatus::Unmodified,
            changed_fields: Vec::new(),
            file_hash: hash.clone(),
            technical: meta.technical,
            fields: std::mem::take(&mut meta.fields),
            custom_fields: meta.custom_fields.take(),
            suggested_filename: None,
            rename_on_save: settings.rename_on_save_default,
            bext: meta.bext,
            info: meta.info,
            analysis: analysis_cache::get_cached_analysis(&self.db, &hash).await?,
            suggestions: None,
        };

        record.id = files::upsert_file(&self.db, &record).await?;
        Ok(self.hydrate(record))
    }

    async fn remove_stale_records(
        &self,
        directory: &Path,
        seen_paths: &HashSet<String>,
    ) -> Result<()> {
        let prefix = std::fs::canonicalize(directory)
            .unwrap_or_else(|_| directory.to_path_buf())
            .display()
            .to_string();
        let under = files::list_under_directory(&self.db, &prefix).await?;
        let stale: Vec<Uuid> = under
            .into_iter()
            .filter(|(_, path)| !seen_paths.contains(path) && !Path::new(path).is_file())
            .map(|(id, _)| id)
            .collect();
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "Removing records for vanished files");
            files::delete_by_ids(&self.db, &stale).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<FileRecord>> {
        let records = files::list_files(&self.db, filter).await?;
        Ok(records.into_iter().map(|r| self.hydrate(r)).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<FileRecord> {
        let record = files::get_file(&self.db, id)
            .await?
            .ok_or_else(|| Error::FileNotFound(id.to_string()))?;
        Ok(self.hydrate(record))
    }

    // -----------------------------------------------------------------------
    // Metadata mutation
    // -----------------------------------------------------------------------

    /// Apply a partial metadata update: validates invariants, tracks
    /// changed fields, recomputes the flag status, and regenerates the
    /// suggested filename when its constituent fields change.
    pub async fn update_metadata(&self, id: Uuid, patch: MetadataPatch) -> Result<FileRecord> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let mut record = files::get_file(&self.db, id)
            .await?
            .ok_or_else(|| Error::FileNotFound(id.to_string()))?;

        if patch.is_empty() {
            return Ok(self.hydrate(record));
        }

        self.apply_patch(&mut record, &patch)?;
        files::update_record(&self.db, &record).await?;
        Ok(self.hydrate(record))
    }

    fn apply_patch(&self, record: &mut FileRecord, patch: &MetadataPatch) -> Result<()> {
        for name in patch.fields.keys() {
            let known =
                METADATA_FIELDS.contains(&name.as_str()) || name == "suggested_filename";
            if !known {
                return Err(Error::Validation(format!("Unknown metadata field: {}", name)));
            }
        }

        let mut changed: HashSet<String> = record.changed_fields.iter().cloned().collect();

        for (name, value) in &patch.fields {
            if name == "suggested_filename" {
                record.suggested_filename = value.clone().filter(|v| !v.is_empty());
            } else {
                record.fields.set(name, value.clone());
            }
            changed.insert(name.clone());
        }

        if let Some(custom) = &patch.custom_fields {
            for tag in custom.keys() {
                validate_custom_tag(tag)?;
            }
            let merged = record.custom_fields.get_or_insert_with(BTreeMap::new);
            for (tag, value) in custom {
                merged.insert(tag.clone(), value.clone());
            }
            changed.insert("custom_fields".to_string());
        }

        self.enforce_category_invariants(record, patch)?;

        record.changed_fields = {
            let mut list: Vec<String> = changed.into_iter().collect();
            list.sort();
            list
        };

        // A flagged record stays flagged until the edit resolves the flag
        // condition; every other edit marks the record dirty.
        record.status = if record.status == FileStatus::Flagged
            && should_flag(
                record.analysis.as_ref().map(|a| a.classification.as_slice()),
                record.fields.category.as_deref(),
            ) {
            FileStatus::Flagged
        } else {
            FileStatus::Modified
        };

        if patch
            .fields
            .keys()
            .any(|name| FILENAME_FIELDS.contains(&name.as_str()))
        {
            if let Some(cat_id) = record.fields.cat_id.clone() {
                let generated = generate_filename(
                    &self.ucs,
                    &FilenameParts {
                        cat_id: &cat_id,
                        fx_name: record.fields.fx_name.as_deref(),
                        creator_id: record.fields.creator_id.as_deref(),
                        source_id: record.fields.source_id.as_deref(),
                        user_category: record.fields.user_category.as_deref(),
                        user_data: None,
                    },
                    &self.settings.get(),
                );
                if generated.valid {
                    record.suggested_filename = Some(generated.filename);
                }
            }
        }

        Ok(())
    }

    /// Invariant checks for supplied classification fields: a supplied
    /// CatID must exist, and a supplied category/subcategory pair must
    /// resolve; resolving updates `cat_id` and `category_full` to match.
    fn enforce_category_invariants(
        &self,
        record: &mut FileRecord,
        patch: &MetadataPatch,
    ) -> Result<()> {
        let touched =
            |name: &str| patch.fields.get(name).map(|v| v.is_some()).unwrap_or(false);

        if touched("cat_id") {
            let cat_id = record.fields.cat_id.clone().unwrap_or_default();
            let info = self
                .ucs
                .get_catid_info(&cat_id)
                .ok_or_else(|| Error::Validation(format!("Unknown CatID: {}", cat_id)))?;
            // Keep the tuple coherent unless the patch set them explicitly.
            if !touched("category") {
                record.fields.category = Some(info.category.clone());
            }
            if !touched("subcategory") {
                record.fields.subcategory = Some(info.subcategory.clone());
            }
            record.fields.category_full = Some(info.category_full());
        }

        if touched("category") || touched("subcategory") {
            match (
                record.fields.category.clone(),
                record.fields.subcategory.clone(),
            ) {
                (Some(category), Some(subcategory)) => {
                    let cat_id = self
                        .ucs
                        .lookup_catid(&category, &subcategory)
                        .ok_or_else(|| {
                            Error::Validation(format!(
                                "No CatID for category '{}' / subcategory '{}'",
                                category, subcategory
                            ))
                        })?;
                    record.fields.cat_id = Some(cat_id.to_string());
                    record.fields.category_full =
                        Some(format!("{}-{}", category, subcategory));
                }
                (category, subcategory) => {
                    // One-sided pairs come from legacy INFO fallbacks; they
                    // are tolerated on records but never derive a CatID.
                    tracing::warn!(
                        ?category,
                        ?subcategory,
                        "Category pair incomplete, skipping CatID derivation"
                    );
                    record.fields.cat_id = None;
                    record.fields.category_full = None;
                }
            }
        }

        Ok(())
    }

    /// Copy the listed fields from one record onto many. Missing targets
    /// are skipped; all updated targets are marked modified.
    pub async fn apply_metadata(
        &self,
        source_id: Uuid,
        target_ids: &[Uuid],
        field_names: &[String],
    ) -> Result<Vec<FileRecord>> {
        for name in field_names {
            if !METADATA_FIELDS.contains(&name.as_str()) {
                return Err(Error::Validation(format!("Unknown metadata field: {}", name)));
            }
        }
        let source = files::get_file(&self.db, source_id)
            .await?
            .ok_or_else(|| Error::FileNotFound(source_id.to_string()))?;

        let mut patch = MetadataPatch::default();
        for name in field_names {
            patch
                .fields
                .insert(name.clone(), source.fields.get(name).map(|s| s.to_string()));
        }

        let mut updated = Vec::new();
        for target_id in target_ids {
            if *target_id == source_id {
                continue;
            }
            match self.update_metadata(*target_id, patch.clone()).await {
                Ok(record) => updated.push(record),
                Err(Error::FileNotFound(_)) => {
                    tracing::warn!(id = %target_id, "apply-metadata target missing, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(updated)
    }

    /// Set the same field values on many records.
    pub async fn batch_update(
        &self,
        ids: &[Uuid],
        updates: BTreeMap<String, Option<String>>,
    ) -> Result<Vec<FileRecord>> {
        let patch = MetadataPatch {
            fields: updates,
            custom_fields: None,
        };
        let mut updated = Vec::new();
        for id in ids {
            match self.update_metadata(*id, patch.clone()).await {
                Ok(record) => updated.push(record),
                Err(Error::FileNotFound(_)) => {
                    tracing::warn!(id = %id, "batch-update target missing, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Save
    // -----------------------------------------------------------------------

    /// Write a record's metadata back into its WAV file via the atomic
    /// rewrite protocol, optionally renaming to the suggested filename or
    /// writing into a copy.
    pub async fn save(&self, id: Uuid, options: &SaveOptions) -> Result<SaveOutcome> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let record = files::get_file(&self.db, id)
            .await?
            .ok_or_else(|| Error::FileNotFound(id.to_string()))?;

        let old_path = PathBuf::from(&record.path);
        if !old_path.is_file() {
            return Err(Error::FileNotFound(record.path.clone()));
        }

        // External-modification check before anything touches disk.
        let current_hash = self.hash_file(&old_path).await?;
        if current_hash != record.file_hash {
            return Err(Error::FileChanged(record.path.clone()));
        }

        if let Some(catid) = record.fields.cat_id.as_deref() {
            if self.ucs.get_catid_info(catid).is_none() {
                return Err(Error::Validation(format!("Unknown CatID: {}", catid)));
            }
        }

        let write_set = build_write_set(&record);

        if let Some(copy_path) = &options.copy_path {
            return self.save_as_copy(record, copy_path, write_set).await;
        }

        // Rename conflicts are detected before the write commits anything.
        let rename_target = self.check_rename(&record, options)?;

        self.write_wav(&old_path, write_set).await?;

        let (final_path, renamed, rename_error) = match &rename_target {
            Some(target) => match std::fs::rename(&old_path, target) {
                Ok(()) => (target.clone(), true, None),
                Err(err) => {
                    tracing::warn!(
                        from = %old_path.display(),
                        to = %target.display(),
                        error = %err,
                        "Rename after save failed; content saved under original name"
                    );
                    (old_path.clone(), false, Some(Error::from_write_io(err, target)))
                }
            },
            None => (old_path.clone(), false, None),
        };

        let updated = self.finalize_save(record, &final_path).await?;

        // The write is committed even when the post-write rename failed;
        // the record is consistent, the caller still sees the error.
        if let Some(err) = rename_error {
            return Err(err);
        }

        Ok(SaveOutcome {
            file: self.hydrate(updated),
            old_path: old_path.display().to_string(),
            new_path: final_path.display().to_string(),
            renamed,
            copied: false,
            copy_path: None,
        })
    }

    fn check_rename(&self, record: &FileRecord, options: &SaveOptions) -> Result<Option<PathBuf>> {
        let Some(suggested) = record.suggested_filename.as_deref() else {
            return Ok(None);
        };
        if !options.rename || suggested == record.filename {
            return Ok(None);
        }
        let target = Path::new(&record.directory).join(suggested);
        if target.exists() {
            return Err(Error::RenameConflict(target.display().to_string()));
        }
        Ok(Some(target))
    }

    async fn save_as_copy(
        &self,
        record: FileRecord,
        copy_path: &Path,
        write_set: MetadataWriteSet,
    ) -> Result<SaveOutcome> {
        let parent_ok = copy_path.parent().map(|p| p.is_dir()).unwrap_or(false);
        if !parent_ok {
            return Err(Error::Validation(format!(
                "Parent directory does not exist: {}",
                copy_path.display()
            )));
        }

        let source = PathBuf::from(&record.path);
        let dest = copy_path.to_path_buf();
        let copy_result = tokio::task::spawn_blocking(move || std::fs::copy(&source, &dest))
            .await
            .map_err(|e| Error::Internal(format!("Copy task failed: {}", e)))?;
        copy_result.map_err(|e| Error::from_write_io(e, copy_path))?;

        if let Err(err) = self.write_wav(copy_path, write_set).await {
            let _ = std::fs::remove_file(copy_path);
            return Err(err);
        }

        Ok(SaveOutcome {
            old_path: record.path.clone(),
            new_path: record.path.clone(),
            file: self.hydrate(record),
            renamed: false,
            copied: true,
            copy_path: Some(copy_path.display().to_string()),
        })
    }

    async fn finalize_save(&self, mut record: FileRecord, final_path: &Path) -> Result<FileRecord> {
        record.file_hash = self.hash_file(final_path).await?;
        record.path = final_path.display().to_string();
        record.filename = final_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        record.directory = final_path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        record.status = FileStatus::Saved;
        record.changed_fields.clear();

        // Refresh the chunk snapshots so gap detection on the next save
        // sees what is actually on disk now.
        let snapshot_path = final_path.to_path_buf();
        if let Ok(meta) = tokio::task::spawn_blocking(move || read_metadata(&snapshot_path))
            .await
            .map_err(|e| Error::Internal(format!("Snapshot task failed: {}", e)))?
        {
            record.bext = meta.bext;
            record.info = meta.info;
        }

        files::update_record(&self.db, &record).await?;
        Ok(record)
    }

    /// Save many records sequentially. Failures become entries in the
    /// result, never aborts; cancellation is honored between files.
    pub async fn save_batch(
        &self,
        ids: &[Uuid],
        rename: bool,
        cancel: &CancellationToken,
    ) -> BatchSaveOutcome {
        let mut results: Vec<BatchSaveResult> = Vec::new();
        let mut cancelled = false;

        for id in ids {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let options = SaveOptions {
                rename,
                copy_path: None,
            };
            match self.save(*id, &options).await {
                Ok(outcome) => results.push(BatchSaveResult {
                    id: *id,
                    success: true,
                    renamed: outcome.renamed,
                    new_path: Some(outcome.new_path),
                    error_code: None,
                    error: None,
                }),
                Err(err) => results.push(BatchSaveResult {
                    id: *id,
                    success: false,
                    renamed: false,
                    new_path: None,
                    error_code: Some(err.code().to_string()),
                    error: Some(err.to_string()),
                }),
            }
        }

        let saved_count = results.iter().filter(|r| r.success).count();
        BatchSaveOutcome {
            failed_count: results.len() - saved_count,
            saved_count,
            results,
            cancelled,
        }
    }

    /// Discard in-memory edits by re-reading metadata from disk.
    pub async fn revert(&self, id: Uuid) -> Result<FileRecord> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let mut record = files::get_file(&self.db, id)
            .await?
            .ok_or_else(|| Error::FileNotFound(id.to_string()))?;

        let path = PathBuf::from(&record.path);
        if !path.is_file() {
            return Err(Error::FileNotFound(record.path.clone()));
        }

        let read_path = path.clone();
        let mut meta = tokio::task::spawn_blocking(move || {
            let mut meta = read_metadata(&read_path)?;
            apply_import_fallbacks(&mut meta);
            Ok::<_, Error>(meta)
        })
        .await
        .map_err(|e| Error::Internal(format!("Read task failed: {}", e)))??;

        record.file_hash = self.hash_file(&path).await?;
        record.technical = meta.technical;
        record.fields = std::mem::take(&mut meta.fields);
        record.custom_fields = meta.custom_fields.take();
        record.bext = meta.bext;
        record.info = meta.info;
        record.status = FileStatus::Unmodified;
        record.changed_fields.clear();
        record.suggested_filename = None;

        files::update_record(&self.db, &record).await?;
        Ok(self.hydrate(record))
    }

    /// Remove records. The backing WAV files are untouched.
    pub async fn remove(&self, ids: &[Uuid]) -> Result<u64> {
        files::delete_by_ids(&self.db, ids).await
    }

    /// Wipe both the file table and the analysis cache.
    pub async fn reset(&self) -> Result<()> {
        files::clear_files(&self.db).await?;
        analysis_cache::clear_analysis_cache(&self.db).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Run (or fetch cached) classification for one file, store it in the
    /// cache and on the record, and flag low-confidence results.
    pub async fn analyze(&self, id: Uuid, options: &AnalyzeOptions) -> Result<FileRecord> {
        if !self.model_gate.is_ready() {
            return Err(Error::ModelNotReady("Models still loading".to_string()));
        }

        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let mut record = files::get_file(&self.db, id)
            .await?
            .ok_or_else(|| Error::FileNotFound(id.to_string()))?;

        let analysis = self.run_analysis(&record, options).await?;
        record.analysis = Some(analysis);

        // Pre-fill empty creator/source from settings so the first save
        // stamps them without an explicit edit.
        let settings = self.settings.get();
        if record.fields.creator_id.is_none() && !settings.creator_id.is_empty() {
            record.fields.creator_id = Some(settings.creator_id.clone());
        }
        if record.fields.source_id.is_none() && !settings.source_id.is_empty() {
            record.fields.source_id = Some(settings.source_id.clone());
        }

        if should_flag(
            record.analysis.as_ref().map(|a| a.classification.as_slice()),
            record.fields.category.as_deref(),
        ) {
            record.status = FileStatus::Flagged;
        }

        files::update_record(&self.db, &record).await?;
        Ok(self.hydrate(record))
    }

    async fn run_analysis(
        &self,
        record: &FileRecord,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult> {
        if !options.force {
            if let Some(cached) =
                analysis_cache::get_cached_analysis(&self.db, &record.file_hash).await?
            {
                tracing::debug!(hash = %record.file_hash, "Analysis cache hit");
                return Ok(cached);
            }
        }

        let output = self
            .classifier
            .analyze(Path::new(&record.path), options)
            .await
            .map_err(|err| match err {
                err @ (Error::AnalysisFailed(_) | Error::ModelNotReady(_)) => err,
                other => Error::AnalysisFailed(other.to_string()),
            })?;

        let analyzed_at = self.clock.now().to_rfc3339();
        analysis_cache::store_cached_analysis(
            &self.db,
            &record.file_hash,
            &output.classification,
            output.caption.as_deref(),
            &output.model_version,
            &analyzed_at,
        )
        .await?;

        // Read back through the cache so the record carries exactly the
        // retained candidate list.
        analysis_cache::get_cached_analysis(&self.db, &record.file_hash)
            .await?
            .ok_or_else(|| Error::Internal("Analysis cache write not visible".to_string()))
    }

    /// Analyze many records sequentially with per-file error collection.
    pub async fn analyze_batch(
        &self,
        ids: &[Uuid],
        options: &AnalyzeOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchAnalyzeOutcome> {
        if !self.model_gate.is_ready() {
            return Err(Error::ModelNotReady("Models still loading".to_string()));
        }

        let mut results: Vec<BatchAnalyzeResult> = Vec::new();
        let mut cancelled = false;
        for id in ids {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.analyze(*id, options).await {
                Ok(_) => results.push(BatchAnalyzeResult {
                    id: *id,
                    success: true,
                    error_code: None,
                    error: None,
                }),
                Err(err) => results.push(BatchAnalyzeResult {
                    id: *id,
                    success: false,
                    error_code: Some(err.code().to_string()),
                    error: Some(err.to_string()),
                }),
            }
        }

        let analyzed_count = results.iter().filter(|r| r.success).count();
        Ok(BatchAnalyzeOutcome {
            failed_count: results.len() - analyzed_count,
            analyzed_count,
            results,
            cancelled,
        })
    }

    // -----------------------------------------------------------------------
    // Blocking-pool helpers
    // -----------------------------------------------------------------------

    async fn hash_file(&self, path: &Path) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || compute_file_hash(&path))
            .await
            .map_err(|e| Error::Internal(format!("Hash task failed: {}", e)))?
    }

    async fn write_wav(&self, path: &Path, write_set: MetadataWriteSet) -> Result<()> {
        let path_buf = path.to_path_buf();
        let now = self.clock.now();
        tokio::task::spawn_blocking(move || write_metadata(&path_buf, &write_set, now))
            .await
            .map_err(|e| Error::Internal(format!("Write task failed: {}", e)))?
    }
}

/// Assemble the WAV write set from a record: all non-empty built-in
/// fields plus the custom USER tags.
fn build_write_set(record: &FileRecord) -> MetadataWriteSet {
    MetadataWriteSet {
        fields: record.fields.to_map(),
        custom_fields: record.custom_fields.clone().unwrap_or_default(),
    }
}

fn warn_on_unknown_catid(ucs: &UcsEngine, cat_id: &Option<String>, path: &str) {
    if let Some(cat_id) = cat_id {
        if ucs.get_catid_info(cat_id).is_none() {
            tracing::warn!(path = %path, cat_id = %cat_id, "File carries unknown CatID");
        }
    }
}

/// Collect `*.wav` paths (case-insensitive), sorted for deterministic
/// import order. Hidden directories are skipped.
fn scan_wav_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with('.')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}
