use anyhow::Result;
use tracing::info;

use super::session::{Dialect, SqlSession};
use super::{
    CommitScope, ConflictPolicy, EMBEDDINGS_TABLE, EmbeddingStore, KEY_COLUMNS, PARAMS_PER_ROW,
    UpsertSummary, abort_upload, encode_payloads, row_params, values_tuple,
};
use crate::error::SyncError;
use crate::model::{Backend, EmbeddingRecord};
use crate::progress::{ProgressEvent, ProgressObserver, Stage, batch_count};

/// Multi-row `INSERT ... ON CONFLICT DO NOTHING` inside one transaction that
/// spans the whole upload. An existing row for a key is never touched.
pub struct BulkInsertStore<S> {
    session: S,
    backend: Backend,
    chunk_size: usize,
}

impl<S: SqlSession> BulkInsertStore<S> {
    pub fn new(session: S, backend: Backend, chunk_size: usize) -> Self {
        Self {
            session,
            backend,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Rows per statement, bounded by the dialect's bind-parameter ceiling.
    fn rows_per_statement(&self) -> usize {
        let ceiling = self.session.dialect().max_bind_params() / PARAMS_PER_ROW;
        self.chunk_size.min(ceiling).max(1)
    }

    fn insert_chunk(&mut self, chunk: &[EmbeddingRecord]) -> Result<u64> {
        let payloads = encode_payloads(chunk)?;
        let dialect = self.session.dialect();
        let page_size = self.rows_per_statement();
        let mut written = 0u64;

        for (page_index, page) in chunk.chunks(page_size).enumerate() {
            let offset = page_index * page_size;
            let sql = bulk_insert_sql(dialect, page.len());
            let params = page
                .iter()
                .zip(&payloads[offset..offset + page.len()])
                .flat_map(|(record, payload)| row_params(record, payload))
                .collect::<Vec<&str>>();
            written += self.session.execute(&sql, &params)?;
        }

        Ok(written)
    }

    #[cfg(test)]
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

pub(super) fn bulk_insert_sql(dialect: Dialect, rows: usize) -> String {
    let values = (0..rows)
        .map(|row| values_tuple(dialect, row * PARAMS_PER_ROW + 1))
        .collect::<Vec<String>>()
        .join(", ");

    format!(
        "INSERT INTO {EMBEDDINGS_TABLE} ({KEY_COLUMNS}, embedding, created_at, updated_at) \
         VALUES {values} \
         ON CONFLICT ({KEY_COLUMNS}) DO NOTHING"
    )
}

impl<S: SqlSession> EmbeddingStore for BulkInsertStore<S> {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::KeepFirst
    }

    fn commit_scope(&self) -> CommitScope {
        CommitScope::WholeRun
    }

    fn session(&mut self) -> &mut dyn SqlSession {
        &mut self.session
    }

    fn upsert(
        &mut self,
        records: &[EmbeddingRecord],
        observer: &mut dyn ProgressObserver,
    ) -> Result<UpsertSummary, SyncError> {
        if records.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let total_chunks = batch_count(records.len(), self.chunk_size);
        info!(
            backend = %self.backend,
            rows = records.len(),
            chunk_size = self.chunk_size,
            rows_per_statement = self.rows_per_statement(),
            "bulk insert in a single transaction"
        );

        self.session.begin().map_err(|err| SyncError::Store {
            chunks_committed: 0,
            rolled_back: "no transaction was opened".to_string(),
            source: err.into(),
        })?;

        let mut written = 0u64;
        let mut uploaded = 0usize;
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            match self.insert_chunk(chunk) {
                Ok(count) => written += count,
                Err(err) => {
                    return Err(abort_upload(
                        &mut self.session,
                        err,
                        0,
                        "rolled back the entire upload".to_string(),
                    ));
                }
            }

            uploaded += chunk.len();
            observer.on_progress(ProgressEvent {
                stage: Stage::Upload,
                completed_batches: index + 1,
                total_batches: total_chunks,
                completed_items: uploaded,
                total_items: records.len(),
            });
        }

        info!("committing transaction");
        if let Err(err) = self.session.commit() {
            return Err(abort_upload(
                &mut self.session,
                err,
                0,
                "rolled back the entire upload".to_string(),
            ));
        }

        Ok(UpsertSummary {
            rows_submitted: records.len(),
            rows_written: written,
            chunks_committed: total_chunks,
        })
    }
}
