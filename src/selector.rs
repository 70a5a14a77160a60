use tracing::info;

use crate::error::SyncError;
use crate::model::CatalogRecord;
use crate::store::session::SqlSession;
use crate::store::{CATALOG_TABLE, EMBEDDINGS_TABLE};

/// Left anti-join of the catalog against the embeddings table on the full
/// natural key. Rows with a NULL key component are skipped since they cannot
/// be matched on a later run. A limit of zero means no limit.
pub fn unembedded_query(limit: Option<usize>) -> String {
    let mut sql = format!(
        "
        SELECT
          gc.study_accession,
          gc.snps,
          gc.strongest_snp_risk_allele,
          COALESCE(gc.mapped_trait, '') || ' ' ||
          COALESCE(gc.disease_trait, '') || ' ' ||
          COALESCE(gc.study, '') || ' ' ||
          COALESCE(gc.mapped_gene, '') AS combined_text
        FROM {CATALOG_TABLE} gc
        LEFT JOIN {EMBEDDINGS_TABLE} se ON (
          se.study_accession = gc.study_accession
          AND se.snps = gc.snps
          AND se.strongest_snp_risk_allele = gc.strongest_snp_risk_allele
        )
        WHERE se.study_accession IS NULL
          AND gc.study_accession IS NOT NULL
          AND gc.snps IS NOT NULL
          AND gc.strongest_snp_risk_allele IS NOT NULL
        "
    );

    if let Some(limit) = limit.filter(|limit| *limit > 0) {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    sql
}

/// Catalog records that have no embedding yet. Always queried fresh, which is
/// what lets an interrupted run resume.
pub fn select_unembedded(
    session: &mut dyn SqlSession,
    limit: Option<usize>,
) -> Result<Vec<CatalogRecord>, SyncError> {
    let records = session
        .query_catalog(&unembedded_query(limit))
        .map_err(|err| SyncError::Fetch(err.into()))?;

    info!(
        records = records.len(),
        limit = limit.map(|value| value as i64).unwrap_or(-1),
        "found catalog records without embeddings"
    );
    Ok(records)
}

pub fn count_catalog(session: &mut dyn SqlSession) -> Result<i64, SyncError> {
    session
        .query_count(&format!(
            "SELECT COUNT(*) FROM {CATALOG_TABLE}
             WHERE study_accession IS NOT NULL
               AND snps IS NOT NULL
               AND strongest_snp_risk_allele IS NOT NULL"
        ))
        .map_err(|err| SyncError::Fetch(err.into()))
}

pub fn count_unembedded(session: &mut dyn SqlSession) -> Result<i64, SyncError> {
    session
        .query_count(&format!(
            "SELECT COUNT(*) FROM ({}) pending",
            unembedded_query(None)
        ))
        .map_err(|err| SyncError::Fetch(err.into()))
}
