//! Portable local copy of generated embeddings.
//!
//! A cache file is a zstd-compressed JSON document. Two layouts exist:
//!
//! * current: `study_accessions`, `snps`, `risk_alleles` as parallel arrays;
//! * legacy: `study_keys`, each `accession|variant_id|risk_allele`.
//!
//! Both carry `embeddings` (one row per key, same order) and `dimensions`.
//! Loading sniffs the layout, current markers first, and normalizes either
//! one into keys plus vectors.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SyncError;
use crate::model::{EmbeddingRecord, StudyKey};

pub const CACHE_FORMAT_VERSION: u32 = 2;
const COMPRESSION_LEVEL: i32 = 3;
const LEGACY_KEY_DELIMITER: char = '|';

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayout {
    Current,
    Legacy,
}

#[derive(Debug, Clone)]
pub struct LoadedCache {
    pub layout: CacheLayout,
    pub dimensions: usize,
    pub keys: Vec<StudyKey>,
    pub vectors: Vec<Vec<f32>>,
}

impl LoadedCache {
    pub fn into_records(self) -> Vec<EmbeddingRecord> {
        self.keys
            .into_iter()
            .zip(self.vectors)
            .map(|(key, vector)| EmbeddingRecord::new(key, vector))
            .collect()
    }
}

#[derive(Serialize)]
struct CurrentDocument<'a> {
    format_version: u32,
    study_accessions: Vec<&'a str>,
    snps: Vec<&'a str>,
    risk_alleles: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    dimensions: usize,
}

/// Every field either layout may carry; which ones are present decides the
/// layout.
#[derive(Deserialize)]
struct RawDocument {
    study_accessions: Option<Vec<String>>,
    snps: Option<Vec<String>>,
    risk_alleles: Option<Vec<String>>,
    study_keys: Option<Vec<String>>,
    embeddings: Option<Vec<Vec<f32>>>,
    dimensions: Option<usize>,
}

enum KeyColumns {
    Current {
        accessions: Vec<String>,
        variant_ids: Vec<String>,
        risk_alleles: Vec<String>,
    },
    Legacy(Vec<String>),
}

/// Writes `records` to `path` in the current layout.
pub fn save_cache(path: &Path, records: &[EmbeddingRecord]) -> Result<u64, SyncError> {
    let dimensions = records.first().map(|record| record.vector.len()).unwrap_or(0);
    if let Some(bad) = records.iter().find(|record| record.vector.len() != dimensions) {
        return Err(SyncError::cache_format(
            path,
            format!(
                "vector for {} has {} dimensions, expected {dimensions}",
                bad.key,
                bad.vector.len()
            ),
        ));
    }

    if let Some(bad) = records
        .iter()
        .find(|record| record.vector.iter().any(|value| !value.is_finite()))
    {
        return Err(SyncError::cache_format(
            path,
            format!("vector for {} contains a non-finite value", bad.key),
        ));
    }

    info!(path = %path.display(), "saving embeddings to local file");

    let document = CurrentDocument {
        format_version: CACHE_FORMAT_VERSION,
        study_accessions: records.iter().map(|r| r.key.accession.as_str()).collect(),
        snps: records.iter().map(|r| r.key.variant_id.as_str()).collect(),
        risk_alleles: records.iter().map(|r| r.key.risk_allele.as_str()).collect(),
        embeddings: records.iter().map(|r| r.vector.as_slice()).collect(),
        dimensions,
    };

    let io_failed = |source: std::io::Error| SyncError::CacheIo {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_failed)?;
    let mut encoder =
        zstd::Encoder::new(BufWriter::new(file), COMPRESSION_LEVEL).map_err(io_failed)?;
    serde_json::to_writer(&mut encoder, &document).map_err(|err| {
        SyncError::cache_format(path, format!("failed to encode cache document: {err}"))
    })?;
    encoder
        .finish()
        .and_then(|writer| writer.into_inner().map_err(|err| err.into_error()))
        .map_err(io_failed)?;

    let bytes = fs::metadata(path).map_err(io_failed)?.len();
    info!(
        path = %path.display(),
        size_mb = %format!("{:.1}", bytes as f64 / 1024.0 / 1024.0),
        keys = records.len(),
        dimensions,
        "embeddings saved"
    );

    Ok(bytes)
}

/// Reads a cache file of either layout.
pub fn load_cache(path: &Path) -> Result<LoadedCache, SyncError> {
    if !path.exists() {
        return Err(SyncError::CacheNotFound {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), "loading embeddings from local file");

    let file = File::open(path).map_err(|source| SyncError::CacheIo {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = zstd::Decoder::new(file).map_err(|source| SyncError::CacheIo {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawDocument = serde_json::from_reader(BufReader::new(decoder)).map_err(|err| {
        SyncError::cache_format(path, format!("corrupt or unreadable archive: {err}"))
    })?;

    let loaded = resolve_document(path, raw)?;
    info!(
        layout = ?loaded.layout,
        keys = loaded.keys.len(),
        dimensions = loaded.dimensions,
        "embeddings loaded"
    );
    Ok(loaded)
}

fn resolve_document(path: &Path, raw: RawDocument) -> Result<LoadedCache, SyncError> {
    let columns = match (raw.study_accessions, raw.study_keys) {
        (Some(accessions), _) => KeyColumns::Current {
            accessions,
            variant_ids: raw
                .snps
                .ok_or_else(|| SyncError::cache_format(path, "missing 'snps' array"))?,
            risk_alleles: raw
                .risk_alleles
                .ok_or_else(|| SyncError::cache_format(path, "missing 'risk_alleles' array"))?,
        },
        (None, Some(study_keys)) => KeyColumns::Legacy(study_keys),
        (None, None) => {
            return Err(SyncError::cache_format(
                path,
                "unrecognized format: neither 'study_accessions' nor 'study_keys' present",
            ));
        }
    };

    let vectors = raw
        .embeddings
        .ok_or_else(|| SyncError::cache_format(path, "missing 'embeddings' array"))?;
    let dimensions = raw
        .dimensions
        .ok_or_else(|| SyncError::cache_format(path, "missing 'dimensions' scalar"))?;

    let (layout, keys) = match columns {
        KeyColumns::Current {
            accessions,
            variant_ids,
            risk_alleles,
        } => {
            if accessions.len() != variant_ids.len() || accessions.len() != risk_alleles.len() {
                return Err(SyncError::cache_format(
                    path,
                    format!(
                        "key arrays differ in length ({}, {}, {})",
                        accessions.len(),
                        variant_ids.len(),
                        risk_alleles.len()
                    ),
                ));
            }
            let keys = accessions
                .into_iter()
                .zip(variant_ids)
                .zip(risk_alleles)
                .map(|((accession, variant_id), risk_allele)| {
                    StudyKey::new(accession, variant_id, risk_allele)
                })
                .collect::<Vec<StudyKey>>();
            (CacheLayout::Current, keys)
        }
        KeyColumns::Legacy(study_keys) => {
            let keys = study_keys
                .iter()
                .map(|raw_key| split_legacy_key(path, raw_key))
                .collect::<Result<Vec<StudyKey>, SyncError>>()?;
            (CacheLayout::Legacy, keys)
        }
    };

    if vectors.len() != keys.len() {
        return Err(SyncError::cache_format(
            path,
            format!("{} embedding rows for {} keys", vectors.len(), keys.len()),
        ));
    }
    if let Some((index, row)) = vectors
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != dimensions)
    {
        return Err(SyncError::cache_format(
            path,
            format!(
                "embedding row {index} has {} values, expected {dimensions}",
                row.len()
            ),
        ));
    }

    Ok(LoadedCache {
        layout,
        dimensions,
        keys,
        vectors,
    })
}

fn split_legacy_key(path: &Path, raw_key: &str) -> Result<StudyKey, SyncError> {
    let parts = raw_key.split(LEGACY_KEY_DELIMITER).collect::<Vec<&str>>();
    match parts.as_slice() {
        [accession, variant_id, risk_allele] => {
            Ok(StudyKey::new(*accession, *variant_id, *risk_allele))
        }
        _ => Err(SyncError::cache_format(
            path,
            format!(
                "invalid study_key format: {raw_key} (expected 3 parts, got {})",
                parts.len()
            ),
        )),
    }
}
