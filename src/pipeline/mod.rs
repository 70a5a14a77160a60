//! The two sync runs.
//!
//! Generate: select unembedded keys, vectorize, optionally save a local copy,
//! upload. Restore: load a local copy, upload. Stages run strictly one after
//! another and the first fatal error ends the run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::cache::{load_cache, save_cache};
use crate::error::SyncError;
use crate::model::{EmbeddingRecord, SUPPORTED_DIMENSIONS};
use crate::progress::ProgressObserver;
use crate::selector::select_unembedded;
use crate::store::EmbeddingStore;
use crate::util::sha256_file;
use crate::vectorize::{Vectorizer, generate_embeddings, validate_dimensions};

mod report;

pub use report::{LocalSaveStatus, RunStatus, SyncMode, SyncReport};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub generation_batch_size: usize,
    pub upload_batch_size: usize,
    pub dimensions: usize,
    pub limit: Option<usize>,
    pub save_local: Option<PathBuf>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            generation_batch_size: 512,
            upload_batch_size: 1000,
            dimensions: 512,
            limit: None,
            save_local: None,
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.generation_batch_size == 0 {
            return Err(SyncError::Config("batch size must be at least 1".to_string()));
        }
        if self.upload_batch_size == 0 {
            return Err(SyncError::Config(
                "upload batch size must be at least 1".to_string(),
            ));
        }
        if !SUPPORTED_DIMENSIONS.contains(&self.dimensions) {
            return Err(SyncError::Config(format!(
                "dimensions must be one of {SUPPORTED_DIMENSIONS:?}, got {}",
                self.dimensions
            )));
        }
        Ok(())
    }
}

pub fn run_generate(
    store: &mut dyn EmbeddingStore,
    vectorizer: &mut dyn Vectorizer,
    options: &SyncOptions,
    observer: &mut dyn ProgressObserver,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    options.validate()?;
    validate_dimensions(options.dimensions, vectorizer.native_dimension())?;

    let mut report = SyncReport::begin(SyncMode::Generate, &*store, options.dimensions);
    report.model_name = Some(vectorizer.model_name().to_string());
    info!(
        run_id = %report.run_id,
        backend = %report.backend,
        conflict_policy = ?report.conflict_policy,
        commit_scope = ?report.commit_scope,
        "starting embedding generation"
    );

    let catalog = select_unembedded(store.session(), options.limit)?;
    report.selected_records = catalog.len();
    if catalog.is_empty() {
        info!("all catalog records already have embeddings");
        report.status = RunStatus::UpToDate;
        return Ok(report.finish(started));
    }

    let texts = catalog
        .iter()
        .map(|record| record.combined_text.clone())
        .collect::<Vec<String>>();
    let vectors = generate_embeddings(
        vectorizer,
        &texts,
        options.generation_batch_size,
        options.dimensions,
        observer,
    )?;
    let records = catalog
        .into_iter()
        .zip(vectors)
        .map(|(record, vector)| EmbeddingRecord::new(record.key, vector))
        .collect::<Vec<EmbeddingRecord>>();
    report.embedded_records = records.len();

    if let Some(path) = options.save_local.as_deref() {
        save_side_copy(path, &records, &mut report);
    }

    let summary = store.upsert(&records, observer)?;
    report.record_upload(summary);

    info!(
        run_id = %report.run_id,
        selected = report.selected_records,
        uploaded = report.uploaded_rows,
        written = report.written_rows,
        "embedding generation completed"
    );
    Ok(report.finish(started))
}

/// The local copy is a side backup here, so a failure is logged and the
/// upload still happens.
fn save_side_copy(path: &Path, records: &[EmbeddingRecord], report: &mut SyncReport) {
    match save_cache(path, records) {
        Ok(_) => {
            report.record_local_save(path, LocalSaveStatus::Saved);
            match sha256_file(path) {
                Ok(checksum) => report.cache_sha256 = Some(checksum),
                Err(err) => warn!(error = %err, "could not checksum local copy"),
            }
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to save embeddings locally, continuing with upload"
            );
            report.record_local_save(path, LocalSaveStatus::Failed);
            report
                .warnings
                .push(format!("local save to {} failed: {err}", path.display()));
        }
    }
}

pub fn run_restore(
    store: &mut dyn EmbeddingStore,
    cache_path: &Path,
    observer: &mut dyn ProgressObserver,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let loaded = load_cache(cache_path)?;
    if !loaded.keys.is_empty() && !SUPPORTED_DIMENSIONS.contains(&loaded.dimensions) {
        return Err(SyncError::cache_format(
            cache_path,
            format!(
                "embedding width {} is not one of {SUPPORTED_DIMENSIONS:?}",
                loaded.dimensions
            ),
        ));
    }

    let mut report = SyncReport::begin(SyncMode::Restore, &*store, loaded.dimensions);
    report.cache_path = Some(cache_path.display().to_string());
    report.cache_layout = Some(loaded.layout);
    match sha256_file(cache_path) {
        Ok(checksum) => report.cache_sha256 = Some(checksum),
        Err(err) => warn!(error = %err, "could not checksum cache file"),
    }
    info!(
        run_id = %report.run_id,
        backend = %report.backend,
        conflict_policy = ?report.conflict_policy,
        commit_scope = ?report.commit_scope,
        "restoring embeddings from local file"
    );

    let records = loaded.into_records();
    report.embedded_records = records.len();

    let summary = store.upsert(&records, observer)?;
    report.record_upload(summary);

    info!(
        run_id = %report.run_id,
        uploaded = report.uploaded_rows,
        written = report.written_rows,
        "embeddings restored"
    );
    Ok(report.finish(started))
}
