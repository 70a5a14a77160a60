use anyhow::{Result, ensure};
use sha2::{Digest, Sha256};

use super::{Vectorizer, l2_normalize};

pub const LOCAL_MODEL_NAME: &str = "local-hash-v1";

/// Offline vectorizer: signed feature hashing over word unigrams and bigrams.
///
/// Deterministic across builds and platforms, which makes it useful for dry
/// runs and fixtures. It does not have the nested-embedding property, so
/// truncated vectors from it are not meaningful lower-dimensional embeddings.
#[derive(Debug, Clone)]
pub struct LocalHashVectorizer {
    dimensions: usize,
}

impl LocalHashVectorizer {
    pub fn new(dimensions: usize) -> Result<Self> {
        ensure!(dimensions > 0, "local vectorizer needs a positive dimension");
        Ok(Self { dimensions })
    }

    pub fn embed_one(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0_f32; self.dimensions];

        for feature in features(input) {
            let hash = stable_hash(&feature);
            let index = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
            vector[index] += sign * weight;
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Vectorizer for LocalHashVectorizer {
    fn model_name(&self) -> &str {
        LOCAL_MODEL_NAME
    }

    fn native_dimension(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|input| self.embed_one(input)).collect())
    }
}

fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn features(input: &str) -> Vec<String> {
    let words = input
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|character| character.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<String>>();

    let mut out = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        out.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            out.push(format!("b:{word}_{next}"));
        }
    }
    out
}
