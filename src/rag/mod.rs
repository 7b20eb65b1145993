//! Embedding pipeline: chunk, embed, store; and the matching query path.

#[cfg(test)]
mod tests;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{ChunkMetadata, EmbeddingRecord, VectorStore};
use crate::documents::Document;
use crate::embeddings::{Chunk, Chunker, Embedder, embedder_from_config};
use crate::{DobbError, Result};

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source: String,
    pub chunks_stored: usize,
    pub collection: String,
}

/// A chunk returned by similarity search, most relevant first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub source: String,
    pub chunk_index: u32,
}

pub struct EmbeddingPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    batch_size: usize,
}

impl EmbeddingPipeline {
    #[inline]
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Wire the configured chunker, embedding client and vector store
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let chunker =
            Chunker::new(&config.chunking).map_err(|e| DobbError::Config(e.to_string()))?;
        let embedder = embedder_from_config(&config.embeddings)?;
        let store = VectorStore::open(
            &config.vector_database_path(),
            &config.store.collection,
            embedder.dimensions(),
        )
        .await?;
        info!(
            "Vector store {} at {} ({} dimensions, model {})",
            store.collection(),
            store.path().display(),
            store.vector_dimension(),
            embedder.model_id()
        );
        Ok(Self::new(
            chunker,
            embedder,
            Arc::new(store),
            config.embeddings.batch_size as usize,
        ))
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Chunk, embed and store a document.
    ///
    /// Chunks are written batch by batch; on failure the error reports how
    /// many chunks made it into the store.
    #[inline]
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        if document.text.trim().is_empty() {
            return Err(DobbError::Validation(format!(
                "Document '{}' contains no text",
                document.source
            )));
        }
        self.check_dimensions()?;

        let document_id = document_id(document);
        let created_at = chrono::Utc::now().to_rfc3339();
        info!(
            "Ingesting '{}' ({} chars) as document {}",
            document.source,
            document.text.chars().count(),
            document_id
        );

        let mut chunks = self
            .chunker
            .chunks(&document.text)
            .filter(|chunk| !chunk.text.trim().is_empty());
        let mut stored = 0;

        loop {
            let batch: Vec<Chunk> = chunks.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embed_texts(texts)
                .await
                .map_err(|e| e.into_embedding_service(stored))?;

            let records: Vec<EmbeddingRecord> = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddingRecord {
                    id: chunk_id(&document.source, &chunk),
                    vector,
                    metadata: ChunkMetadata {
                        document_id: document_id.clone(),
                        source: document.source.clone(),
                        mime_type: document.mime_type.clone(),
                        content: chunk.text,
                        chunk_index: saturating_u32(chunk.index),
                        char_offset: saturating_u32(chunk.char_offset),
                        token_count: saturating_u32(chunk.token_count),
                        embedding_model: self.embedder.model_id().to_string(),
                        created_at: created_at.clone(),
                    },
                })
                .collect();

            stored += self
                .store
                .upsert(&records)
                .await
                .map_err(|e| e.into_embedding_service(stored))?;
            debug!("Stored {} chunks of '{}' so far", stored, document.source);
        }

        info!("Ingested {} chunks from '{}'", stored, document.source);
        Ok(IngestReport {
            document_id,
            source: document.source.clone(),
            chunks_stored: stored,
            collection: self.store.collection().to_string(),
        })
    }

    /// Find the `k` stored chunks closest to `text`
    #[inline]
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if text.trim().is_empty() {
            return Err(DobbError::Validation("Query text is empty".to_string()));
        }
        if k == 0 {
            return Err(DobbError::Validation(
                "Number of results must be at least 1".to_string(),
            ));
        }
        self.check_dimensions()?;

        let vector = self
            .embed_texts(vec![text.to_string()])
            .await
            .map_err(|e| e.into_embedding_service(0))?
            .pop()
            .ok_or_else(|| DobbError::EmbeddingService {
                message: "Embedding model returned no vector".to_string(),
                chunks_stored: 0,
            })?;

        let results = self.store.search_similar(&vector, k).await?;
        debug!("Query matched {} chunks", results.len());

        Ok(results
            .into_iter()
            .map(|result| RetrievedChunk {
                id: result.id,
                text: result.chunk_metadata.content,
                score: result.similarity_score,
                source: result.chunk_metadata.source,
                chunk_index: result.chunk_metadata.chunk_index,
            })
            .collect())
    }

    fn check_dimensions(&self) -> Result<()> {
        let model_dim = self.embedder.dimensions();
        let store_dim = self.store.vector_dimension();
        if model_dim != store_dim {
            warn!(
                "Model {} produces {} dimensions, collection {} holds {}",
                self.embedder.model_id(),
                model_dim,
                self.store.collection(),
                store_dim
            );
            return Err(DobbError::EmbeddingService {
                message: format!(
                    "Model {} produces {}-dimensional vectors but collection {} holds {}-dimensional vectors; use a different collection",
                    self.embedder.model_id(),
                    model_dim,
                    self.store.collection(),
                    store_dim
                ),
                chunks_stored: 0,
            });
        }
        Ok(())
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| DobbError::Other(anyhow::anyhow!("Embedding task failed: {}", e)))?
            .map_err(DobbError::Other)
    }
}

/// Stable id for a document's full content
fn document_id(document: &Document) -> String {
    let key = format!("{}\u{0}{}", document.source, document.text);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Stable id for one chunk, so re-ingesting the same text replaces rows
fn chunk_id(source: &str, chunk: &Chunk) -> String {
    let key = format!("{}\u{0}{}\u{0}{}", source, chunk.index, chunk.text);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
