use anyhow::{Context, Result};
use postgres::types::ToSql;
use postgres::{Client, NoTls};

use super::session::{Dialect, SqlSession};
use crate::model::{CatalogRecord, StudyKey};

pub struct PostgresSession {
    client: Client,
}

impl PostgresSession {
    pub fn connect(connection_string: &str) -> Result<Self> {
        let client = Client::connect(connection_string, NoTls).with_context(|| {
            format!(
                "failed to connect to Postgres at {}",
                redact_connection_string(connection_string)
            )
        })?;
        Ok(Self { client })
    }
}

/// Host portion of a connection string, without user or password.
pub fn redact_connection_string(connection_string: &str) -> &str {
    match connection_string.rsplit_once('@') {
        Some((_, host)) => host,
        None => connection_string,
    }
}

fn bind<'a>(params: &'a [&'a str]) -> Vec<&'a (dyn ToSql + Sync)> {
    params
        .iter()
        .map(|value| value as &(dyn ToSql + Sync))
        .collect()
}

impl SqlSession for PostgresSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<u64> {
        let changed = self.client.execute(sql, &bind(params))?;
        Ok(changed)
    }

    fn execute_each(&mut self, sql: &str, rows: &[Vec<&str>]) -> Result<u64> {
        let statement = self.client.prepare(sql)?;
        let mut changed = 0u64;
        for row in rows {
            changed += self.client.execute(&statement, &bind(row))?;
        }
        Ok(changed)
    }

    fn query_catalog(&mut self, sql: &str) -> Result<Vec<CatalogRecord>> {
        let rows = self.client.query(sql, &[])?;
        let mut out = Vec::<CatalogRecord>::with_capacity(rows.len());

        for row in rows {
            out.push(CatalogRecord {
                key: StudyKey::new(
                    row.try_get::<_, String>(0)?,
                    row.try_get::<_, String>(1)?,
                    row.try_get::<_, String>(2)?,
                ),
                combined_text: row.try_get(3)?,
            });
        }

        Ok(out)
    }

    fn query_count(&mut self, sql: &str) -> Result<i64> {
        let row = self.client.query_one(sql, &[])?;
        Ok(row.try_get(0)?)
    }

    fn query_optional_text(&mut self, sql: &str, params: &[&str]) -> Result<Option<String>> {
        let row = self.client.query_opt(sql, &bind(params))?;
        match row {
            Some(row) => Ok(Some(row.try_get(0)?)),
            None => Ok(None),
        }
    }
}
