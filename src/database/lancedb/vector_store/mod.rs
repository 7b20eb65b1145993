#[cfg(test)]
mod tests;

use super::{ChunkMetadata, EmbeddingRecord};
use crate::DobbError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Vector database store using LanceDB for similarity search.
///
/// One table per collection. The vector dimension is fixed when the table is
/// created and every later write or query must match it.
pub struct VectorStore {
    table: Table,
    path: PathBuf,
    collection: String,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub chunk_metadata: ChunkMetadata,
    /// `1 - cosine distance`; higher is more similar
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Open (or create) the collection table under `db_path`.
    ///
    /// An existing table keeps its own dimension, which may differ from
    /// `vector_dimension`; writes of the wrong size are rejected later
    /// instead of recreating the table.
    #[inline]
    pub async fn open(
        db_path: &Path,
        collection: &str,
        vector_dimension: usize,
    ) -> Result<Self, DobbError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            DobbError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| DobbError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| DobbError::Database(format!("Failed to list tables: {}", e)))?;

        let (table, vector_dimension) = if table_names.iter().any(|name| name == collection) {
            let table = connection
                .open_table(collection)
                .execute()
                .await
                .map_err(|e| DobbError::Database(format!("Failed to open table: {}", e)))?;
            let existing = Self::detect_vector_dimension(&table).await?;
            if existing != vector_dimension {
                info!(
                    "Collection {} holds {}-dimensional vectors, embedder produces {}",
                    collection, existing, vector_dimension
                );
            }
            (table, existing)
        } else {
            info!(
                "Creating collection {} with {} dimensions",
                collection, vector_dimension
            );
            let table = connection
                .create_empty_table(collection, Self::create_schema(vector_dimension))
                .execute()
                .await
                .map_err(|e| DobbError::Database(format!("Failed to create table: {}", e)))?;
            (table, vector_dimension)
        };

        info!("Vector store initialized successfully");
        Ok(Self {
            table,
            path: db_path.to_path_buf(),
            collection: collection.to_string(),
            vector_dimension,
        })
    }

    /// Detect vector dimension from existing table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize, DobbError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| DobbError::Database(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                DobbError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("mime_type", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("char_offset", DataType::UInt32, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("embedding_model", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Directory holding the database files
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Insert or replace records by id.
    ///
    /// The whole batch is rejected if any record has the wrong dimension or
    /// empty content.
    #[inline]
    pub async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize, DobbError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(0);
        }

        self.validate_records(records)?;
        debug!("Storing batch of {} embeddings", records.len());

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = self.table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| DobbError::Database(format!("Failed to insert embeddings: {}", e)))?;

        info!(
            "Stored {} embeddings in {}",
            records.len(),
            self.collection
        );
        Ok(records.len())
    }

    fn validate_records(&self, records: &[EmbeddingRecord]) -> Result<(), DobbError> {
        for record in records {
            if record.vector.len() != self.vector_dimension {
                return Err(DobbError::EmbeddingService {
                    message: format!(
                        "Vector for chunk {} has {} dimensions but collection {} stores {}",
                        record.metadata.chunk_index,
                        record.vector.len(),
                        self.collection,
                        self.vector_dimension
                    ),
                    chunks_stored: 0,
                });
            }
            if record.metadata.content.trim().is_empty() {
                return Err(DobbError::Validation(format!(
                    "Chunk {} of {} has no text",
                    record.metadata.chunk_index, record.metadata.source
                )));
            }
        }
        Ok(())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch, DobbError> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    DobbError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let strings = |f: fn(&EmbeddingRecord) -> &str| -> Arc<dyn Array> {
            Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<_>>()))
        };
        let numbers = |f: fn(&EmbeddingRecord) -> u32| -> Arc<dyn Array> {
            Arc::new(UInt32Array::from(records.iter().map(f).collect::<Vec<_>>()))
        };

        let arrays: Vec<Arc<dyn Array>> = vec![
            strings(|r| r.id.as_str()),
            Arc::new(vector_array),
            strings(|r| r.metadata.document_id.as_str()),
            strings(|r| r.metadata.source.as_str()),
            strings(|r| r.metadata.mime_type.as_str()),
            strings(|r| r.metadata.content.as_str()),
            numbers(|r| r.metadata.chunk_index),
            numbers(|r| r.metadata.char_offset),
            numbers(|r| r.metadata.token_count),
            strings(|r| r.metadata.embedding_model.as_str()),
            strings(|r| r.metadata.created_at.as_str()),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| DobbError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Return the `limit` nearest chunks by cosine distance, nearest first
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, DobbError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if query_vector.len() != self.vector_dimension {
            return Err(DobbError::EmbeddingService {
                message: format!(
                    "Query vector has {} dimensions but collection {} stores {}",
                    query_vector.len(),
                    self.collection,
                    self.vector_dimension
                ),
                chunks_stored: 0,
            });
        }

        if limit == 0 || self.count_embeddings().await? == 0 {
            return Ok(Vec::new());
        }

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| DobbError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| DobbError::Database(format!("Failed to execute search: {}", e)))?;

        self.parse_search_results_stream(results).await
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>, DobbError> {
        let mut search_results = Vec::new();

        while let Some(batch_result) = results
            .try_next()
            .await
            .map_err(|e| DobbError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch_result)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, DobbError> {
        let ids = column::<StringArray>(batch, "id")?;
        let document_ids = column::<StringArray>(batch, "document_id")?;
        let sources = column::<StringArray>(batch, "source")?;
        let mime_types = column::<StringArray>(batch, "mime_type")?;
        let contents = column::<StringArray>(batch, "content")?;
        let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
        let char_offsets = column::<UInt32Array>(batch, "char_offset")?;
        let token_counts = column::<UInt32Array>(batch, "token_count")?;
        let models = column::<StringArray>(batch, "embedding_model")?;
        let created_ats = column::<StringArray>(batch, "created_at")?;

        // Extract distance scores if available
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let results = (0..batch.num_rows())
            .map(|row| {
                let distance =
                    distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

                SearchResult {
                    id: ids.value(row).to_string(),
                    chunk_metadata: ChunkMetadata {
                        document_id: document_ids.value(row).to_string(),
                        source: sources.value(row).to_string(),
                        mime_type: mime_types.value(row).to_string(),
                        content: contents.value(row).to_string(),
                        chunk_index: chunk_indices.value(row),
                        char_offset: char_offsets.value(row),
                        token_count: token_counts.value(row),
                        embedding_model: models.value(row).to_string(),
                        created_at: created_ats.value(row).to_string(),
                    },
                    similarity_score: 1.0 - distance,
                    distance,
                }
            })
            .collect();

        Ok(results)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64, DobbError> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| DobbError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, DobbError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DobbError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| DobbError::Database(format!("Invalid {} column type", name)))
}
