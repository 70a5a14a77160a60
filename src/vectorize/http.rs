use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{Vectorizer, l2_normalize};

/// Blocking client for an OpenAI-compatible `/embeddings` endpoint.
///
/// One request per batch, no retries: a failed request fails the run.
pub struct HttpVectorizer {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpVectorizer {
    pub fn new(
        base_url: &str,
        model: String,
        dimensions: usize,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        ensure!(!base_url.trim().is_empty(), "missing embedding endpoint");
        ensure!(!model.trim().is_empty(), "missing embedding model name");
        ensure!(dimensions > 0, "native dimension must be positive");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .context("invalid embedding API key")?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }
}

impl Vectorizer for HttpVectorizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn native_dimension(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("embedding request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("embedding request failed ({status}): {body}");
        }

        let parsed: EmbeddingResponse = response
            .json()
            .context("failed to parse embedding response")?;
        into_ordered_vectors(parsed, inputs.len())
    }
}

fn into_ordered_vectors(mut parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    parsed.data.sort_by_key(|entry| entry.index);
    ensure!(
        parsed.data.len() == expected,
        "endpoint returned {} embeddings for {} inputs",
        parsed.data.len(),
        expected
    );
    for (position, entry) in parsed.data.iter().enumerate() {
        ensure!(
            entry.index == position,
            "endpoint returned embedding index {} where {position} was expected",
            entry.index
        );
    }

    Ok(parsed
        .data
        .into_iter()
        .map(|entry| {
            let mut vector = entry.embedding;
            l2_normalize(&mut vector);
            vector
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{EmbeddingResponse, into_ordered_vectors};

    #[test]
    fn response_entries_are_reordered_by_index_and_normalized() {
        let raw = r#"{"data":[
            {"index":1,"embedding":[0.0,2.0]},
            {"index":0,"embedding":[3.0,4.0]}
        ]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).expect("response parses");

        let vectors = into_ordered_vectors(parsed, 2).expect("two vectors");
        assert_eq!(vectors[0], vec![0.6, 0.8]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn short_responses_are_rejected() {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#)
                .expect("response parses");

        let err = into_ordered_vectors(parsed, 3).expect_err("count mismatch");
        assert!(err.to_string().contains("1 embeddings for 3 inputs"));
    }

    #[test]
    fn repeated_indices_are_rejected() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":0,"embedding":[1.0,0.0]},{"index":0,"embedding":[0.0,1.0]}]}"#,
        )
        .expect("response parses");

        let err = into_ordered_vectors(parsed, 2).expect_err("index 1 missing");
        assert!(err.to_string().contains("index 0 where 1 was expected"));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":0,"embedding":[1.0]},{"index":5,"embedding":[1.0]}]}"#,
        )
        .expect("response parses");

        let err = into_ordered_vectors(parsed, 2).expect_err("index 5 out of range");
        assert!(err.to_string().contains("index 5 where 1 was expected"));
    }
}
