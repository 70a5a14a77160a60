//! Embedding sink: idempotent chunked upsert of `(key, vector)` pairs into
//! `study_embeddings`.
//!
//! Two strategies exist and they do NOT agree on what a duplicate key means:
//! [`BulkInsertStore`] keeps the first vector ever written and commits the
//! whole upload at once, [`ChunkedUpsertStore`] overwrites with the latest
//! vector and commits chunk by chunk. The backend picks the strategy once, in
//! [`open_store`].

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::{Backend, EmbeddingRecord, StudyKey};
use crate::progress::ProgressObserver;

mod bulk_insert;
mod chunked_upsert;
pub mod pg;
pub mod session;
pub mod sqlite;
#[cfg(test)]
mod tests;

pub use bulk_insert::BulkInsertStore;
pub use chunked_upsert::ChunkedUpsertStore;
use pg::{PostgresSession, redact_connection_string};
use session::{Dialect, SqlSession};
use sqlite::SqliteSession;

pub const EMBEDDINGS_TABLE: &str = "study_embeddings";
pub const CATALOG_TABLE: &str = "gwas_catalog";
pub const KEY_COLUMNS: &str = "study_accession, snps, strongest_snp_risk_allele";

/// What happens to an existing row when the same key is written again.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    KeepFirst,
    KeepLast,
}

/// Which writes survive a failure part way through an upload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitScope {
    WholeRun,
    PerChunk,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub rows_submitted: usize,
    pub rows_written: u64,
    pub chunks_committed: usize,
}

pub trait EmbeddingStore {
    fn backend(&self) -> Backend;

    fn conflict_policy(&self) -> ConflictPolicy;

    fn commit_scope(&self) -> CommitScope;

    /// Connection shared with the key selector.
    fn session(&mut self) -> &mut dyn SqlSession;

    /// Persists the batch so that later selections exclude its keys.
    fn upsert(
        &mut self,
        records: &[EmbeddingRecord],
        observer: &mut dyn ProgressObserver,
    ) -> Result<UpsertSummary, SyncError>;
}

#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    Sqlite(PathBuf),
    Postgres(String),
}

impl ConnectionTarget {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Sqlite(_) => Backend::Sqlite,
            Self::Postgres(_) => Backend::Postgres,
        }
    }
}

/// Connects to the target and wraps it in the strategy its backend uses.
pub fn open_store(
    target: &ConnectionTarget,
    upload_batch_size: usize,
) -> Result<Box<dyn EmbeddingStore>, SyncError> {
    let connectivity = |source: anyhow::Error| SyncError::Connectivity {
        backend: target.backend(),
        source: source.into(),
    };

    match target {
        ConnectionTarget::Sqlite(db_path) => {
            info!(path = %db_path.display(), "connecting to SQLite");
            let session = SqliteSession::open(db_path).map_err(connectivity)?;
            Ok(Box::new(ChunkedUpsertStore::new(
                session,
                Backend::Sqlite,
                upload_batch_size,
            )))
        }
        ConnectionTarget::Postgres(connection_string) => {
            info!(
                host = redact_connection_string(connection_string),
                "connecting to PostgreSQL"
            );
            let session = PostgresSession::connect(connection_string).map_err(connectivity)?;
            Ok(Box::new(BulkInsertStore::new(
                session,
                Backend::Postgres,
                upload_batch_size,
            )))
        }
    }
}

/// Reads back the stored vector for `key`, if any.
pub fn load_embedding(session: &mut dyn SqlSession, key: &StudyKey) -> Result<Option<Vec<f32>>> {
    let dialect = session.dialect();
    let sql = format!(
        "SELECT {} FROM {EMBEDDINGS_TABLE} \
         WHERE study_accession = {} AND snps = {} AND strongest_snp_risk_allele = {}",
        dialect.embedding_as_text(),
        dialect.placeholder(1),
        dialect.placeholder(2),
        dialect.placeholder(3),
    );
    let raw = session.query_optional_text(
        &sql,
        &[
            key.accession.as_str(),
            key.variant_id.as_str(),
            key.risk_allele.as_str(),
        ],
    )?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn count_embeddings(session: &mut dyn SqlSession) -> Result<i64> {
    session.query_count(&format!("SELECT COUNT(*) FROM {EMBEDDINGS_TABLE}"))
}

/// One `(key..., embedding)` value tuple for an insert statement.
fn values_tuple(dialect: Dialect, first_param: usize) -> String {
    format!(
        "({}, {}, {}, {}, {now}, {now})",
        dialect.placeholder(first_param),
        dialect.placeholder(first_param + 1),
        dialect.placeholder(first_param + 2),
        dialect.embedding_placeholder(first_param + 3),
        now = dialect.now(),
    )
}

const PARAMS_PER_ROW: usize = 4;

/// JSON payloads for a chunk, serialized ahead of binding.
fn encode_payloads(records: &[EmbeddingRecord]) -> Result<Vec<String>> {
    records
        .iter()
        .map(|record| Ok(record.vector_json()?))
        .collect()
}

fn row_params<'a>(record: &'a EmbeddingRecord, payload: &'a str) -> [&'a str; PARAMS_PER_ROW] {
    [
        record.key.accession.as_str(),
        record.key.variant_id.as_str(),
        record.key.risk_allele.as_str(),
        payload,
    ]
}

/// Rolls back the open transaction and wraps the write failure.
fn abort_upload(
    session: &mut dyn SqlSession,
    source: anyhow::Error,
    chunks_committed: usize,
    rolled_back: String,
) -> SyncError {
    if let Err(rollback_err) = session.rollback() {
        warn!(error = %rollback_err, "rollback after failed upload also failed");
    }
    SyncError::Store {
        chunks_committed,
        rolled_back,
        source: source.into(),
    }
}
