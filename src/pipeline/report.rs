use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::cache::CacheLayout;
use crate::model::Backend;
use crate::store::{CommitScope, ConflictPolicy, EmbeddingStore, UpsertSummary};
use crate::util::{now_utc_string, utc_compact_string};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Generate,
    Restore,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    UpToDate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalSaveStatus {
    Saved,
    Failed,
}

/// Run manifest written after a successful sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub mode: SyncMode,
    pub backend: Backend,
    pub conflict_policy: ConflictPolicy,
    pub commit_scope: CommitScope,
    pub model_name: Option<String>,
    pub dimensions: usize,
    pub selected_records: usize,
    pub embedded_records: usize,
    pub uploaded_rows: usize,
    pub written_rows: u64,
    pub chunks_committed: usize,
    pub local_save_path: Option<String>,
    pub local_save_status: Option<LocalSaveStatus>,
    pub cache_path: Option<String>,
    pub cache_layout: Option<CacheLayout>,
    pub cache_sha256: Option<String>,
    pub duration_ms: u128,
    pub status: RunStatus,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub(super) fn begin(mode: SyncMode, store: &dyn EmbeddingStore, dimensions: usize) -> Self {
        let prefix = match mode {
            SyncMode::Generate => "generate",
            SyncMode::Restore => "restore",
        };

        Self {
            manifest_version: 1,
            run_id: format!("{prefix}-{}", utc_compact_string(Utc::now())),
            generated_at: now_utc_string(),
            mode,
            backend: store.backend(),
            conflict_policy: store.conflict_policy(),
            commit_scope: store.commit_scope(),
            model_name: None,
            dimensions,
            selected_records: 0,
            embedded_records: 0,
            uploaded_rows: 0,
            written_rows: 0,
            chunks_committed: 0,
            local_save_path: None,
            local_save_status: None,
            cache_path: None,
            cache_layout: None,
            cache_sha256: None,
            duration_ms: 0,
            status: RunStatus::Completed,
            warnings: Vec::new(),
        }
    }

    pub(super) fn record_upload(&mut self, summary: UpsertSummary) {
        self.uploaded_rows = summary.rows_submitted;
        self.written_rows = summary.rows_written;
        self.chunks_committed = summary.chunks_committed;
    }

    pub(super) fn record_local_save(&mut self, path: &Path, status: LocalSaveStatus) {
        self.local_save_path = Some(path.display().to_string());
        self.local_save_status = Some(status);
    }

    pub(super) fn finish(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis();
        self
    }
}
