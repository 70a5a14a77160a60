use anyhow::Result;
use tracing::info;

use super::session::{Dialect, SqlSession};
use super::{
    CommitScope, ConflictPolicy, EMBEDDINGS_TABLE, EmbeddingStore, KEY_COLUMNS, UpsertSummary,
    abort_upload, encode_payloads, row_params, values_tuple,
};
use crate::error::SyncError;
use crate::model::{Backend, EmbeddingRecord};
use crate::progress::{ProgressEvent, ProgressObserver, Stage, batch_count};

/// Row-by-row `INSERT ... ON CONFLICT DO UPDATE`, one transaction per chunk.
/// A re-written key takes the newest vector and a fresh `updated_at`.
pub struct ChunkedUpsertStore<S> {
    session: S,
    backend: Backend,
    chunk_size: usize,
}

impl<S: SqlSession> ChunkedUpsertStore<S> {
    pub fn new(session: S, backend: Backend, chunk_size: usize) -> Self {
        Self {
            session,
            backend,
            chunk_size: chunk_size.max(1),
        }
    }

    fn write_chunk(&mut self, sql: &str, chunk: &[EmbeddingRecord]) -> Result<u64> {
        let payloads = encode_payloads(chunk)?;
        let rows = chunk
            .iter()
            .zip(&payloads)
            .map(|(record, payload)| row_params(record, payload).to_vec())
            .collect::<Vec<Vec<&str>>>();

        self.session.begin()?;
        let written = self.session.execute_each(sql, &rows)?;
        self.session.commit()?;
        Ok(written)
    }

    #[cfg(test)]
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

pub(super) fn upsert_sql(dialect: Dialect) -> String {
    format!(
        "INSERT INTO {EMBEDDINGS_TABLE} ({KEY_COLUMNS}, embedding, created_at, updated_at) \
         VALUES {} \
         ON CONFLICT ({KEY_COLUMNS}) DO UPDATE SET \
           embedding = excluded.embedding, \
           updated_at = {}",
        values_tuple(dialect, 1),
        dialect.now(),
    )
}

impl<S: SqlSession> EmbeddingStore for ChunkedUpsertStore<S> {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::KeepLast
    }

    fn commit_scope(&self) -> CommitScope {
        CommitScope::PerChunk
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
            "chunked upsert, committing per chunk"
        );

        let sql = upsert_sql(self.session.dialect());
        let mut written = 0u64;
        let mut uploaded = 0usize;
        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            match self.write_chunk(&sql, chunk) {
                Ok(count) => written += count,
                Err(err) => {
                    return Err(abort_upload(
                        &mut self.session,
                        err,
                        index,
                        format!("rolled back in-flight chunk {} of {total_chunks}", index + 1),
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

        Ok(UpsertSummary {
            rows_submitted: records.len(),
            rows_written: written,
            chunks_committed: total_chunks,
        })
    }
}
