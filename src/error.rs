use std::path::PathBuf;

use thiserror::Error;

use crate::model::Backend;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the sync stages. Every variant is fatal to the stage
/// that raised it; only a failed optional cache save is downgraded by the
/// pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not connect to {backend} backend")]
    Connectivity {
        backend: Backend,
        #[source]
        source: BoxError,
    },

    #[error("failed to select catalog records without embeddings")]
    Fetch(#[source] BoxError),

    #[error("vectorization failed on batch {batch} of {total_batches}")]
    Vectorization {
        batch: usize,
        total_batches: usize,
        #[source]
        source: BoxError,
    },

    #[error("embedding upload failed after {chunks_committed} committed chunk(s); {rolled_back}")]
    Store {
        chunks_committed: usize,
        rolled_back: String,
        #[source]
        source: BoxError,
    },

    #[error("cache file not found: {}", path.display())]
    CacheNotFound { path: PathBuf },

    #[error("invalid cache file {}: {reason}", path.display())]
    CacheFormat { path: PathBuf, reason: String },

    #[error("cache file i/o failed for {}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connectivity { .. } => "connectivity",
            Self::Fetch(_) => "fetch",
            Self::Vectorization { .. } => "vectorization",
            Self::Store { .. } => "store",
            Self::CacheNotFound { .. } => "cache_not_found",
            Self::CacheFormat { .. } => "cache_format",
            Self::CacheIo { .. } => "cache_io",
        }
    }

    pub(crate) fn cache_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
