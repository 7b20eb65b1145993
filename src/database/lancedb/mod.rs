// LanceDB vector database module
// Handles vector storage and similarity search for embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{SearchResult, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Content-derived identifier, stable across re-ingestion
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// ID of the document this chunk was cut from
    pub document_id: String,
    /// File name or URL of the source document
    pub source: String,
    pub mime_type: String,
    /// The actual text content of the chunk
    pub content: String,
    /// Index of this chunk within the document (for ordering)
    pub chunk_index: u32,
    /// Character offset of the chunk within the document
    pub char_offset: u32,
    pub token_count: u32,
    /// Model that produced the vector
    pub embedding_model: String,
    /// RFC 3339 timestamp when this embedding was created
    pub created_at: String,
}
