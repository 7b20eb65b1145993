// Embeddings module
// Embedding model clients and content chunking

pub mod chunking;
pub mod mock;
pub mod ollama;
pub mod openai;

use anyhow::{Result, anyhow};
use std::sync::Arc;

use crate::config::{EmbeddingProvider, EmbeddingsConfig};

pub use chunking::{Chunk, Chunker, ChunkingConfig, Chunks, estimate_token_count};
pub use mock::MockEmbedder;
pub use ollama::OllamaClient;
pub use openai::OpenAiEmbeddingClient;

/// A text embedding model.
///
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embed several texts, returning one vector per input in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the pinned model, stored alongside every vector.
    fn model_id(&self) -> &str;

    /// Expected vector length.
    fn dimensions(&self) -> usize;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("Embedding model returned no vector"))
    }
}

/// Build the configured embedding client
#[inline]
pub fn embedder_from_config(config: &EmbeddingsConfig) -> Result<Arc<dyn Embedder>> {
    Ok(match config.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaClient::new(config)?),
        EmbeddingProvider::OpenAi => Arc::new(OpenAiEmbeddingClient::new(config)?),
    })
}

/// Fail when a model returns vectors of the wrong count or length
pub(crate) fn check_vectors(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimensions: usize,
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(anyhow!(
            "Mismatch between request and response counts: {} vs {}",
            expected_count,
            vectors.len()
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(anyhow!(
            "Embedding has {} dimensions, expected {}",
            bad.len(),
            dimensions
        ));
    }
    Ok(())
}
