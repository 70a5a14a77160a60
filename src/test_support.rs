use anyhow::{Result, bail};
use rusqlite::{Connection, params};

use crate::model::{EmbeddingRecord, StudyKey};
use crate::store::sqlite::SqliteSession;
use crate::vectorize::{Vectorizer, l2_normalize};

pub const CATALOG_SCHEMA: &str = "
    CREATE TABLE gwas_catalog (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      study_accession TEXT,
      snps TEXT,
      strongest_snp_risk_allele TEXT,
      mapped_trait TEXT,
      disease_trait TEXT,
      study TEXT,
      mapped_gene TEXT
    );

    CREATE TABLE study_embeddings (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      study_accession TEXT NOT NULL,
      snps TEXT NOT NULL,
      strongest_snp_risk_allele TEXT NOT NULL,
      embedding TEXT NOT NULL,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      UNIQUE(study_accession, snps, strongest_snp_risk_allele)
    );
";

/// Aborts any insert of a row whose accession is `BOOM`.
pub const REJECT_BOOM_TRIGGER: &str = "
    CREATE TRIGGER reject_boom BEFORE INSERT ON study_embeddings
    WHEN NEW.study_accession = 'BOOM'
    BEGIN
      SELECT RAISE(ABORT, 'rejected test row');
    END;
";

pub fn memory_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory db");
    connection
        .execute_batch(CATALOG_SCHEMA)
        .expect("schema created");
    connection
}

pub fn memory_session() -> SqliteSession {
    SqliteSession::from_connection(memory_connection())
}

pub fn insert_catalog(
    session: &SqliteSession,
    key: (&str, &str, &str),
    texts: [Option<&str>; 4],
) {
    session
        .connection()
        .execute(
            "INSERT INTO gwas_catalog
               (study_accession, snps, strongest_snp_risk_allele, mapped_trait, disease_trait, study, mapped_gene)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![key.0, key.1, key.2, texts[0], texts[1], texts[2], texts[3]],
        )
        .expect("catalog row inserted");
}

pub fn insert_embedding(session: &SqliteSession, key: (&str, &str, &str), embedding: &str) {
    session
        .connection()
        .execute(
            "INSERT INTO study_embeddings
               (study_accession, snps, strongest_snp_risk_allele, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'), datetime('now'))",
            params![key.0, key.1, key.2, embedding],
        )
        .expect("embedding row inserted");
}

pub fn embedding_rows(session: &SqliteSession) -> i64 {
    session
        .connection()
        .query_row("SELECT COUNT(*) FROM study_embeddings", [], |row| row.get(0))
        .expect("count embeddings")
}

pub fn record(
    accession: &str,
    variant_id: &str,
    risk_allele: &str,
    vector: Vec<f32>,
) -> EmbeddingRecord {
    EmbeddingRecord::new(StudyKey::new(accession, variant_id, risk_allele), vector)
}

/// Deterministic stand-in for a real model. Each vector is derived from the
/// input text only, so identical inputs give identical vectors.
pub struct FakeVectorizer {
    pub native: usize,
    pub calls: Vec<Vec<String>>,
    pub fail_on_call: Option<usize>,
}

impl FakeVectorizer {
    pub fn new(native: usize) -> Self {
        Self {
            native,
            calls: Vec::new(),
            fail_on_call: None,
        }
    }

    pub fn full_vector(&self, input: &str) -> Vec<f32> {
        let seed = input
            .bytes()
            .fold(17_u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(u32::from(byte)));
        let mut vector = (0..self.native)
            .map(|index| ((seed.wrapping_add(index as u32 * 7919) % 1000) as f32) - 500.0)
            .collect::<Vec<f32>>();
        l2_normalize(&mut vector);
        vector
    }
}

impl Vectorizer for FakeVectorizer {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn native_dimension(&self) -> usize {
        self.native
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.push(inputs.to_vec());
        if self.fail_on_call == Some(self.calls.len()) {
            bail!("simulated model failure");
        }
        Ok(inputs.iter().map(|input| self.full_vector(input)).collect())
    }
}
