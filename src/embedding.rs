//! Embedding gateway.
//!
//! [`Embedder`] is the seam between the pipeline and the embedding model.
//! [`OpenAiEmbedder`] talks to an OpenAI-compatible `/v1/embeddings` endpoint
//! with retry and exponential backoff; [`embed_chunks`] drives batching with
//! a bounded number of in-flight requests while preserving chunk order.
//!
//! Vectors are stored as little-endian f32 BLOBs; [`vec_to_blob`],
//! [`blob_to_vec`] and [`cosine_similarity`] live here so the store and the
//! tests share one encoding.

use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::models::ChunkDraft;

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Expected vector dimension for this model.
    fn dims(&self) -> usize;

    /// Embed a batch of texts. The returned vectors are in input order,
    /// one per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Reads the API key from `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::InvalidConfig("OPENAI_API_KEY is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, CallError> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CallError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::BadRequest(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transient(format!("malformed response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(CallError::Transient(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let mut vectors = Vec::with_capacity(data.len());
        for datum in data {
            if datum.embedding.len() != self.dims {
                return Err(CallError::Dims {
                    expected: self.dims,
                    actual: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_reason = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let secs = 1u64 << (attempt - 1).min(5);
                debug!(attempt, delay_secs = secs, "retrying embedding request");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            match self.request(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(CallError::Dims { expected, actual }) => {
                    return Err(Error::EmbeddingDimensionMismatch { expected, actual });
                }
                Err(CallError::BadRequest(reason)) => {
                    return Err(Error::EmbeddingUnavailable {
                        attempts: attempt + 1,
                        reason,
                    });
                }
                Err(CallError::Transient(reason)) => {
                    warn!(attempt, %reason, "embedding request failed");
                    last_reason = reason;
                }
            }
        }
        Err(Error::EmbeddingUnavailable {
            attempts: self.max_retries + 1,
            reason: last_reason,
        })
    }
}

enum CallError {
    /// Retried with backoff: 429, 5xx, network and decode failures.
    Transient(String),
    /// Fail fast: any other 4xx means retrying cannot help.
    BadRequest(String),
    Dims { expected: usize, actual: usize },
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// Embed a document's chunk drafts in batches of `batch_size`, keeping at
/// most `max_concurrent` requests in flight. The returned vectors align with
/// `drafts` by position. Any batch failure fails the whole call, so a
/// document is embedded all-or-nothing.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    drafts: &[ChunkDraft],
    batch_size: usize,
    max_concurrent: usize,
) -> Result<Vec<Vec<f32>>> {
    let batches: Vec<Vec<String>> = drafts
        .chunks(batch_size.max(1))
        .map(|batch| batch.iter().map(|d| d.content.clone()).collect())
        .collect();

    // `buffered` preserves input order regardless of completion order.
    let results: Vec<Vec<Vec<f32>>> = stream::iter(
        batches
            .into_iter()
            .map(|batch| async move { embedder.embed_batch(&batch).await }),
    )
    .buffered(max_concurrent.max(1))
    .try_collect()
    .await?;

    let mut vectors = Vec::with_capacity(drafts.len());
    for batch in results {
        vectors.extend(batch);
    }
    for v in &vectors {
        if v.len() != embedder.dims() {
            return Err(Error::EmbeddingDimensionMismatch {
                expected: embedder.dims(),
                actual: v.len(),
            });
        }
    }
    Ok(vectors)
}

/// Embed a single query string.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let texts = vec![text.to_string()];
    let mut vectors = embedder.embed_batch(&texts).await?;
    let vector = vectors.pop().ok_or_else(|| Error::EmbeddingUnavailable {
        attempts: 1,
        reason: "embedder returned no vector".to_string(),
    })?;
    if vector.len() != embedder.dims() {
        return Err(Error::EmbeddingDimensionMismatch {
            expected: embedder.dims(),
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Encode a vector as a little-endian f32 BLOB.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 BLOB back into a vector. Trailing bytes that
/// don't fill a full f32 are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]. Returns 0.0 for zero-magnitude or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeEmbedder {
        dims: usize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl FakeEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_sizes.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    fn draft(i: i64, content: &str) -> ChunkDraft {
        ChunkDraft {
            page_number: 1,
            chunk_index: i,
            content: content.to_string(),
        }
    }

    #[test]
    fn blob_round_trips() {
        let v = vec![1.0f32, -2.5, 0.0, 3.75];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn blob_ignores_trailing_bytes() {
        let mut blob = vec_to_blob(&[1.0, 2.0]);
        blob.push(0xFF);
        assert_eq!(blob_to_vec(&blob), vec![1.0, 2.0]);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn embed_chunks_batches_and_preserves_order() {
        let embedder = FakeEmbedder::new(4);
        let drafts: Vec<ChunkDraft> = (0..5)
            .map(|i| draft(i, &"x".repeat(i as usize + 1)))
            .collect();

        let vectors = embed_chunks(&embedder, &drafts, 2, 2).await.unwrap();

        assert_eq!(vectors.len(), 5);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32, "vector {i} out of order");
        }
        assert_eq!(*embedder.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn embed_chunks_rejects_wrong_dimension() {
        struct ShortEmbedder;

        #[async_trait]
        impl Embedder for ShortEmbedder {
            fn model_name(&self) -> &str {
                "short"
            }
            fn dims(&self) -> usize {
                8
            }
            async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
            }
        }

        let err = embed_chunks(&ShortEmbedder, &[draft(0, "hi")], 16, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EmbeddingDimensionMismatch {
                expected: 8,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let embedder = FakeEmbedder::new(4);
        let v = embed_one(&embedder, "abc").await.unwrap();
        assert_eq!(v.len(), 4);
        assert_eq!(v[0], 3.0);
    }
}
