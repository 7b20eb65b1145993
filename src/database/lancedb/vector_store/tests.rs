use super::*;
use tempfile::TempDir;

const DIM: usize = 5;

async fn create_test_store(dim: usize) -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), "test_collection", dim)
        .await
        .expect("should create vector store");
    (store, temp_dir)
}

fn unit_vector(hot: usize) -> Vec<f32> {
    let mut vector = vec![0.01; DIM];
    vector[hot % DIM] = 1.0;
    vector
}

fn create_test_embedding_record(id: &str, chunk_index: u32, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: id.to_string(),
        vector,
        metadata: ChunkMetadata {
            document_id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
            source: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            content: format!("This is test content for chunk {}", chunk_index),
            chunk_index,
            char_offset: chunk_index * 150,
            token_count: 25,
            embedding_model: "mock-5".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[tokio::test]
async fn vector_store_initialization() {
    let (store, _temp_dir) = create_test_store(DIM).await;

    assert_eq!(store.collection(), "test_collection");
    assert_eq!(store.vector_dimension(), DIM);
    assert_eq!(
        store
            .count_embeddings()
            .await
            .expect("should count embeddings"),
        0
    );
}

#[tokio::test]
async fn store_batch_embeddings() {
    let (store, _temp_dir) = create_test_store(DIM).await;

    let records = vec![
        create_test_embedding_record("a", 0, unit_vector(0)),
        create_test_embedding_record("b", 1, unit_vector(1)),
        create_test_embedding_record("c", 2, unit_vector(2)),
    ];

    let stored = store.upsert(&records).await.expect("should store batch");
    assert_eq!(stored, 3);
    assert_eq!(
        store
            .count_embeddings()
            .await
            .expect("should count embeddings"),
        3
    );
}

#[tokio::test]
async fn upsert_is_idempotent_by_id() {
    let (store, _temp_dir) = create_test_store(DIM).await;
    let records = vec![
        create_test_embedding_record("a", 0, unit_vector(0)),
        create_test_embedding_record("b", 1, unit_vector(1)),
    ];

    store.upsert(&records).await.expect("first upsert");
    store.upsert(&records).await.expect("second upsert");

    assert_eq!(
        store
            .count_embeddings()
            .await
            .expect("should count embeddings"),
        2
    );
}

#[tokio::test]
async fn search_returns_nearest_first() {
    let (store, _temp_dir) = create_test_store(DIM).await;
    let records: Vec<_> = (0..4)
        .map(|i| create_test_embedding_record(&format!("id-{}", i), i, unit_vector(i as usize)))
        .collect();
    store.upsert(&records).await.expect("should store batch");

    let results = store
        .search_similar(&unit_vector(2), 3)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, "id-2");
    assert_eq!(results[0].chunk_metadata.chunk_index, 2);
    assert!(results[0].similarity_score > 0.99);
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn empty_store_search_is_empty() {
    let (store, _temp_dir) = create_test_store(DIM).await;
    let results = store
        .search_similar(&unit_vector(0), 3)
        .await
        .expect("search should succeed");
    assert!(results.is_empty());
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let (store, _temp_dir) = create_test_store(DIM).await;

    let record = create_test_embedding_record("a", 0, vec![1.0, 0.0]);
    let result = store.upsert(&[record]).await;
    assert!(matches!(result, Err(DobbError::EmbeddingService { .. })));

    let result = store.search_similar(&[1.0, 0.0], 3).await;
    assert!(matches!(result, Err(DobbError::EmbeddingService { .. })));
}

#[tokio::test]
async fn empty_content_is_rejected() {
    let (store, _temp_dir) = create_test_store(DIM).await;
    let mut record = create_test_embedding_record("a", 0, unit_vector(0));
    record.metadata.content = "   ".to_string();

    let result = store.upsert(&[record]).await;
    assert!(matches!(result, Err(DobbError::Validation(_))));
}

#[tokio::test]
async fn reopen_keeps_existing_dimension() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");
    {
        let store = VectorStore::open(&path, "docs", DIM)
            .await
            .expect("should create vector store");
        store
            .upsert(&[create_test_embedding_record("a", 0, unit_vector(0))])
            .await
            .expect("should store record");
    }

    let reopened = VectorStore::open(&path, "docs", 8)
        .await
        .expect("should reopen vector store");
    assert_eq!(reopened.vector_dimension(), DIM);
    assert_eq!(
        reopened
            .count_embeddings()
            .await
            .expect("should count embeddings"),
        1
    );
}
