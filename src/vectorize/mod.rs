//! Contract with the external embedding capability, plus the two
//! responsibilities the pipeline layers on top of every call: the document
//! task prefix and Matryoshka-style truncation.
//!
//! Truncating to the first `D` components is only meaningful when the model
//! has the nested-embedding property. That is a precondition on the model and
//! cannot be checked here. Truncated vectors are not re-normalized.

use anyhow::Result;
use tracing::info;

use crate::error::SyncError;
use crate::model::SUPPORTED_DIMENSIONS;
use crate::progress::{ProgressEvent, ProgressObserver, Stage, batch_count};

pub mod http;
pub mod local;

pub use http::HttpVectorizer;
pub use local::LocalHashVectorizer;

pub const DOCUMENT_PREFIX: &str = "search_document: ";
#[cfg(test)]
pub const QUERY_PREFIX: &str = "search_query: ";

pub trait Vectorizer {
    fn model_name(&self) -> &str;

    fn native_dimension(&self) -> usize;

    /// One unit-normalized vector of `native_dimension()` per input, in input
    /// order.
    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub fn document_input(text: &str) -> String {
    format!("{DOCUMENT_PREFIX}{}", text.trim())
}

#[cfg(test)]
pub fn query_input(text: &str) -> String {
    format!("{QUERY_PREFIX}{}", text.trim())
}

pub fn truncate_dimensions(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    vector.truncate(dimensions);
    vector
}

pub fn validate_dimensions(requested: usize, native: usize) -> Result<(), SyncError> {
    if !SUPPORTED_DIMENSIONS.contains(&requested) {
        return Err(SyncError::Config(format!(
            "dimensions must be one of {SUPPORTED_DIMENSIONS:?}, got {requested}"
        )));
    }
    if requested > native {
        return Err(SyncError::Config(format!(
            "requested {requested} dimensions but the model only produces {native}"
        )));
    }
    Ok(())
}

pub(crate) fn l2_normalize(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}

/// Embeds `texts` in batches of `batch_size`, one blocking call per batch.
///
/// The first failing batch aborts the whole run; nothing produced so far is
/// returned.
pub fn generate_embeddings(
    vectorizer: &mut dyn Vectorizer,
    texts: &[String],
    batch_size: usize,
    dimensions: usize,
    observer: &mut dyn ProgressObserver,
) -> Result<Vec<Vec<f32>>, SyncError> {
    let batch_size = batch_size.max(1);
    let native = vectorizer.native_dimension();
    validate_dimensions(dimensions, native)?;

    let total_batches = batch_count(texts.len(), batch_size);
    info!(
        model = vectorizer.model_name(),
        texts = texts.len(),
        batch_size,
        dimensions,
        native_dimensions = native,
        "generating embeddings"
    );

    let mut out = Vec::<Vec<f32>>::with_capacity(texts.len());
    for (index, batch) in texts.chunks(batch_size).enumerate() {
        let failed = |source: anyhow::Error| SyncError::Vectorization {
            batch: index + 1,
            total_batches,
            source: source.into(),
        };

        let inputs = batch
            .iter()
            .map(|text| document_input(text))
            .collect::<Vec<String>>();
        let vectors = vectorizer.embed_batch(&inputs).map_err(failed)?;

        if vectors.len() != inputs.len() {
            return Err(failed(anyhow::anyhow!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != native) {
            return Err(failed(anyhow::anyhow!(
                "model returned a {}-dimensional vector, expected {native}",
                bad.len()
            )));
        }
        if let Some(position) = vectors
            .iter()
            .position(|vector| vector.iter().any(|value| !value.is_finite()))
        {
            return Err(failed(anyhow::anyhow!(
                "model returned a non-finite value for input {position} of the batch"
            )));
        }

        out.extend(
            vectors
                .into_iter()
                .map(|vector| truncate_dimensions(vector, dimensions)),
        );
        observer.on_progress(ProgressEvent {
            stage: Stage::Vectorize,
            completed_batches: index + 1,
            total_batches,
            completed_items: out.len(),
            total_items: texts.len(),
        });
    }

    if dimensions < native {
        info!(dimensions, native_dimensions = native, "truncated embeddings");
    }

    Ok(out)
}
