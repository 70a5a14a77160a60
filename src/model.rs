use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite natural key of a catalog association.
///
/// This is not the catalog's own primary key; it is the triple that survives
/// independent reloads of the catalog, so embeddings can be re-attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyKey {
    pub accession: String,
    pub variant_id: String,
    pub risk_allele: String,
}

impl StudyKey {
    pub fn new(
        accession: impl Into<String>,
        variant_id: impl Into<String>,
        risk_allele: impl Into<String>,
    ) -> Self {
        Self {
            accession: accession.into(),
            variant_id: variant_id.into(),
            risk_allele: risk_allele.into(),
        }
    }
}

impl fmt::Display for StudyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.accession, self.variant_id, self.risk_allele)
    }
}

/// A catalog row that still lacks an embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub key: StudyKey,
    pub combined_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub key: StudyKey,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(key: StudyKey, vector: Vec<f32>) -> Self {
        Self { key, vector }
    }

    /// Compact JSON array, the payload written to the `embedding` column.
    pub fn vector_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.vector)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const SUPPORTED_DIMENSIONS: [usize; 4] = [128, 256, 512, 768];
