use anyhow::Result;

use crate::model::CatalogRecord;

/// SQL surface that differs between the two relational backends.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// 1-based positional parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Parameter carrying the JSON-encoded vector into the `embedding` column.
    pub fn embedding_placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}::text::vector"),
        }
    }

    /// Expression reading the `embedding` column back as JSON text.
    pub fn embedding_as_text(self) -> &'static str {
        match self {
            Self::Sqlite => "embedding",
            Self::Postgres => "embedding::text",
        }
    }

    pub fn now(self) -> &'static str {
        match self {
            Self::Sqlite => "datetime('now')",
            Self::Postgres => "NOW()",
        }
    }

    pub fn max_bind_params(self) -> usize {
        match self {
            Self::Sqlite => 32_766,
            Self::Postgres => 65_535,
        }
    }
}

/// Connection seam shared by the key selector and the embedding stores.
///
/// Parameters are always text; dialect-specific casts are expressed in SQL.
pub trait SqlSession {
    fn dialect(&self) -> Dialect;

    /// Runs one or more statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<u64>;

    /// Prepares `sql` once and executes it for every row of parameters.
    fn execute_each(&mut self, sql: &str, rows: &[Vec<&str>]) -> Result<u64>;

    /// Runs a catalog selection returning `(accession, variant_id,
    /// risk_allele, combined_text)` rows.
    fn query_catalog(&mut self, sql: &str) -> Result<Vec<CatalogRecord>>;

    fn query_count(&mut self, sql: &str) -> Result<i64>;

    fn query_optional_text(&mut self, sql: &str, params: &[&str]) -> Result<Option<String>>;

    fn begin(&mut self) -> Result<()> {
        self.execute_batch("BEGIN")
    }

    fn commit(&mut self) -> Result<()> {
        self.execute_batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.execute_batch("ROLLBACK")
    }
}
