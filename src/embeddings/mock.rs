//! Deterministic embedder for tests and offline runs.

use anyhow::Result;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::Embedder;

/// Produces unit vectors derived from a hash of the text.
///
/// Identical texts always map to identical vectors; different texts land
/// nearly orthogonal to each other.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    model_id: String,
}

impl MockEmbedder {
    #[inline]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_id: format!("mock-{}", dimensions),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let bits = hasher.finish();
                (bits % 2001) as f32 / 1000.0 - 1.0
            })
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbedder {
    #[inline]
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
