// Database module
// LanceDB holds the chunk vectors and their metadata

pub mod lancedb;

pub use lancedb::{ChunkMetadata, EmbeddingRecord, SearchResult, VectorStore};
