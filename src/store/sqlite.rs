use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params_from_iter};

use super::session::{Dialect, SqlSession};
use crate::model::{CatalogRecord, StudyKey};

pub struct SqliteSession {
    connection: Connection,
}

impl SqliteSession {
    /// Opens an existing catalog database; the file is never created here.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            bail!("SQLite database not found at {}", db_path.display());
        }

        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;

        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;

        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl SqlSession for SqliteSession {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.connection.execute_batch(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<u64> {
        let changed = self.connection.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    fn execute_each(&mut self, sql: &str, rows: &[Vec<&str>]) -> Result<u64> {
        let mut statement = self.connection.prepare_cached(sql)?;
        let mut changed = 0u64;
        for row in rows {
            changed += statement.execute(params_from_iter(row.iter()))? as u64;
        }
        Ok(changed)
    }

    fn query_catalog(&mut self, sql: &str) -> Result<Vec<CatalogRecord>> {
        let mut statement = self.connection.prepare(sql)?;
        let mut rows = statement.query([])?;
        let mut out = Vec::<CatalogRecord>::new();

        while let Some(row) = rows.next()? {
            out.push(CatalogRecord {
                key: StudyKey::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ),
                combined_text: row.get(3)?,
            });
        }

        Ok(out)
    }

    fn query_count(&mut self, sql: &str) -> Result<i64> {
        let count = self.connection.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }

    fn query_optional_text(&mut self, sql: &str, params: &[&str]) -> Result<Option<String>> {
        let value = self
            .connection
            .query_row(sql, params_from_iter(params.iter()), |row| row.get(0))
            .optional()?;
        Ok(value)
    }
}
