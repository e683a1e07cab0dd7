//! Embedding provider capability (spec §6): maps text to dense vectors in
//! batched (document) and single (query) modes. Grounded on
//! `src/adapter/embedding.rs::Embedder`, generalized from a sync `&self`
//! trait to an async one since production embedding calls are an I/O
//! boundary (spec §5 "Suspension points").

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider returned no results")]
    EmptyResult,
    #[error("embedding model error: {0}")]
    ModelError(String),
    #[error("rate limited, retry after backoff: {0}")]
    Transient(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// `embed_documents`/`embed_query` (spec §6). Implementations must not mix
/// dimensions in the same index; callers validate via `dimensions()`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimensions(&self) -> usize;
}

/// Deterministic embedder for tests: hashes each text into a fixed-size
/// vector so the same text always produces the same embedding and distinct
/// texts produce (with overwhelming probability) distinct vectors, without
/// pulling in a real model. Mirrors the teacher's `MockEmbedder` pattern in
/// `src/adapter/embedding.rs` tests, promoted to a first-class type here
/// since this domain needs a mock embedder in integration tests too, not
/// just unit tests.
pub struct DeterministicEmbedder {
    dimensions: usize,
}

impl DeterministicEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        let mut reader = hasher.finalize_xof();
        let mut bytes = vec![0u8; self.dimensions * 4];
        reader.fill(&mut bytes);
        for (i, slot) in vector.iter_mut().enumerate() {
            let chunk = [bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]];
            // Map to [-1, 1] from an arbitrary u32 so the vector isn't degenerate.
            *slot = (u32::from_le_bytes(chunk) as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_one(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{EmbeddingError, EmbeddingProvider};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Production embedder backed by fastembed (ONNX Runtime). Wraps
    /// `TextEmbedding` in a `Mutex` (its `embed` method needs `&mut self`)
    /// and the blocking call in `block_in_place` so the async trait method
    /// never blocks the executor, per spec §5's I/O-vs-CPU separation.
    pub struct FastEmbedProvider {
        model: Mutex<TextEmbedding>,
        dimensions: usize,
    }

    impl FastEmbedProvider {
        pub fn default_model(dimensions: usize) -> Result<Self, EmbeddingError> {
            let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                dimensions,
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FastEmbedProvider {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let owned: Vec<String> = texts.to_vec();
            // `TextEmbedding::embed` is a blocking ONNX call; run it off the
            // executor so one large batch never stalls other tasks.
            tokio::task::block_in_place(|| {
                let mut model = self.model.lock().unwrap();
                let embeddings = model
                    .embed(owned, None)
                    .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
                if embeddings.is_empty() {
                    return Err(EmbeddingError::EmptyResult);
                }
                Ok(embeddings)
            })
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let results = self.embed_documents(&[text.to_string()]).await?;
            results.into_iter().next().ok_or(EmbeddingError::EmptyResult)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedProvider;

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedder_is_stable() {
        let embedder = DeterministicEmbedder::new(16);
        let a = embedder.embed_query("Fabrikam").await.unwrap();
        let b = embedder.embed_query("Fabrikam").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_text_yields_distinct_vectors() {
        let embedder = DeterministicEmbedder::new(16);
        let a = embedder.embed_query("Fabrikam").await.unwrap();
        let b = embedder.embed_query("Contoso").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cosine_similarity_identical_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }
}
