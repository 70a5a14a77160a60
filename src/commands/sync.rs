use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use super::connection_target;
use crate::cli::{SyncArgs, VectorizerKind};
use crate::pipeline::{SyncOptions, SyncReport, run_generate, run_restore};
use crate::progress::TracingProgress;
use crate::store::open_store;
use crate::util::write_json_pretty;
use crate::vectorize::{HttpVectorizer, LocalHashVectorizer, Vectorizer};

pub fn run(args: SyncArgs) -> Result<()> {
    let options = SyncOptions {
        generation_batch_size: args.batch_size,
        upload_batch_size: args.upload_batch_size,
        dimensions: args.dimensions,
        limit: args.limit,
        save_local: args.save_local.clone(),
    };
    options.validate()?;

    let target = connection_target(&args.connection)?;
    let mut store = open_store(&target, options.upload_batch_size)?;
    let mut progress = TracingProgress;

    let report = match args.load_local.as_deref() {
        Some(cache_path) => {
            info!(path = %cache_path.display(), "loading embeddings from local file");
            run_restore(store.as_mut(), cache_path, &mut progress)?
        }
        None => {
            let mut vectorizer = build_vectorizer(&args)?;
            info!(
                model = vectorizer.model_name(),
                native_dimensions = vectorizer.native_dimension(),
                dimensions = options.dimensions,
                "vectorizer ready"
            );
            run_generate(store.as_mut(), vectorizer.as_mut(), &options, &mut progress)?
        }
    };

    if let Some(path) = args.report_path.as_deref() {
        write_json_pretty(path, &report)
            .with_context(|| format!("failed to write run report: {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }

    log_summary(&report);
    Ok(())
}

fn build_vectorizer(args: &SyncArgs) -> Result<Box<dyn Vectorizer>> {
    match args.vectorizer {
        VectorizerKind::LocalHash => Ok(Box::new(LocalHashVectorizer::new(
            args.native_dimensions,
        )?)),
        VectorizerKind::Http => {
            let Some(endpoint) = args.embedding_endpoint.as_deref() else {
                bail!("--embedding-endpoint is required for the http vectorizer");
            };
            Ok(Box::new(HttpVectorizer::new(
                endpoint,
                args.embedding_model.clone(),
                args.native_dimensions,
                args.embedding_api_key.as_deref(),
                Duration::from_secs(args.request_timeout_secs),
            )?))
        }
    }
}

fn log_summary(report: &SyncReport) {
    info!(
        run_id = %report.run_id,
        status = ?report.status,
        selected = report.selected_records,
        embedded = report.embedded_records,
        uploaded = report.uploaded_rows,
        written = report.written_rows,
        chunks = report.chunks_committed,
        warnings = report.warnings.len(),
        duration_ms = report.duration_ms as u64,
        "sync finished"
    );
}
