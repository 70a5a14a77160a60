pub mod status;
pub mod sync;

use anyhow::{Result, bail};

use crate::cli::{BackendArg, ConnectionArgs};
use crate::store::ConnectionTarget;

/// Resolves the connection flags into one target. Postgres wins by default
/// whenever a connection string is present.
pub(crate) fn connection_target(args: &ConnectionArgs) -> Result<ConnectionTarget> {
    let backend = args.backend.unwrap_or(match args.postgres_url {
        Some(_) => BackendArg::Postgres,
        None => BackendArg::Sqlite,
    });

    match backend {
        BackendArg::Sqlite => Ok(ConnectionTarget::Sqlite(args.db_path.clone())),
        BackendArg::Postgres => match args.postgres_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(ConnectionTarget::Postgres(url.to_string())),
            _ => bail!("postgres backend selected but no --postgres-url / POSTGRES_DB given"),
        },
    }
}
