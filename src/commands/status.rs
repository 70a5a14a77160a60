use anyhow::Result;
use tracing::info;

use super::connection_target;
use crate::cli::StatusArgs;
use crate::selector::{count_catalog, count_unembedded};
use crate::store::{count_embeddings, open_store};

pub fn run(args: StatusArgs) -> Result<()> {
    let target = connection_target(&args.connection)?;
    let mut store = open_store(&target, 1)?;
    let session = store.session();

    let catalog = count_catalog(session)?;
    let embedded = count_embeddings(session)?;
    let pending = count_unembedded(session)?;

    info!(
        backend = %target.backend(),
        catalog_records = catalog,
        embedded_records = embedded,
        pending_records = pending,
        "embedding status"
    );

    Ok(())
}
