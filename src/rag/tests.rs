use super::*;
use crate::documents::DocumentKind;
use crate::embeddings::{ChunkingConfig, MockEmbedder};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const DIM: usize = 64;

/// Succeeds for the first `budget` batches, then fails
struct FlakyEmbedder {
    inner: MockEmbedder,
    budget: usize,
    calls: AtomicUsize,
}

impl Embedder for FlakyEmbedder {
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.budget {
            anyhow::bail!("embedding service unavailable");
        }
        self.inner.embed_batch(texts)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

async fn pipeline_with(
    embedder: Arc<dyn Embedder>,
    size: usize,
    overlap: usize,
    batch_size: usize,
) -> (EmbeddingPipeline, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), "rag_test", DIM)
        .await
        .expect("should open store");
    let chunker = Chunker::new(&ChunkingConfig {
        chunk_size: size,
        chunk_overlap: overlap,
    })
    .expect("chunking config should be valid");
    (
        EmbeddingPipeline::new(chunker, embedder, Arc::new(store), batch_size),
        temp_dir,
    )
}

fn sample_text(len: usize) -> String {
    // Distinct words so every window has distinct text
    let mut text = String::new();
    let mut i = 0;
    while text.len() < len {
        text.push_str(&format!("token{} ", i));
        i += 1;
    }
    text.chars().take(len).collect()
}

#[tokio::test]
async fn ingest_then_query_finds_chunk() {
    let (pipeline, _dir) = pipeline_with(Arc::new(MockEmbedder::new(DIM)), 200, 50, 2).await;
    let document = Document::new("sample.txt", DocumentKind::Text, sample_text(500));

    let report = pipeline.ingest(&document).await.expect("ingest should succeed");
    assert_eq!(report.chunks_stored, 4);
    assert_eq!(report.collection, "rag_test");

    let chunk_two: Vec<_> = pipeline.chunker.chunks(&document.text).collect();
    let results = pipeline
        .query(&chunk_two[2].text, 3)
        .await
        .expect("query should succeed");

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk_index, 2);
    assert_eq!(results[0].text, chunk_two[2].text);
    assert_eq!(results[0].source, "sample.txt");
    assert!(results[0].score > 0.99);
}

#[tokio::test]
async fn reingesting_same_document_is_idempotent() {
    let (pipeline, _dir) = pipeline_with(Arc::new(MockEmbedder::new(DIM)), 100, 20, 8).await;
    let document = Document::new("again.txt", DocumentKind::Text, sample_text(450));

    let first = pipeline.ingest(&document).await.expect("first ingest");
    let second = pipeline.ingest(&document).await.expect("second ingest");

    assert_eq!(first.document_id, second.document_id);
    let count = pipeline
        .store()
        .count_embeddings()
        .await
        .expect("should count");
    assert_eq!(count as usize, first.chunks_stored);
}

#[tokio::test]
async fn partial_failure_reports_progress() {
    let embedder = Arc::new(FlakyEmbedder {
        inner: MockEmbedder::new(DIM),
        budget: 2,
        calls: AtomicUsize::new(0),
    });
    let (pipeline, _dir) = pipeline_with(embedder, 100, 0, 2).await;
    let document = Document::new("flaky.txt", DocumentKind::Text, sample_text(1000));

    let result = pipeline.ingest(&document).await;

    match result {
        Err(DobbError::EmbeddingService { chunks_stored, .. }) => assert_eq!(chunks_stored, 4),
        other => panic!("expected embedding service error, got {:?}", other),
    }
}

#[tokio::test]
async fn dimension_mismatch_fails_without_writing() {
    let (pipeline, _dir) = pipeline_with(Arc::new(MockEmbedder::new(DIM + 1)), 100, 0, 2).await;
    let document = Document::new("wrong.txt", DocumentKind::Text, sample_text(300));

    let result = pipeline.ingest(&document).await;
    assert!(matches!(
        result,
        Err(DobbError::EmbeddingService {
            chunks_stored: 0,
            ..
        })
    ));
    assert_eq!(
        pipeline.store().count_embeddings().await.expect("should count"),
        0
    );
}

#[tokio::test]
async fn query_validates_input() {
    let (pipeline, _dir) = pipeline_with(Arc::new(MockEmbedder::new(DIM)), 100, 0, 2).await;

    assert!(matches!(
        pipeline.query("   ", 3).await,
        Err(DobbError::Validation(_))
    ));
    assert!(matches!(
        pipeline.query("hello", 0).await,
        Err(DobbError::Validation(_))
    ));
}

#[tokio::test]
async fn query_on_empty_store_is_empty() {
    let (pipeline, _dir) = pipeline_with(Arc::new(MockEmbedder::new(DIM)), 100, 0, 2).await;
    let results = pipeline.query("anything", 3).await.expect("query should succeed");
    assert!(results.is_empty());
}

#[tokio::test]
async fn blank_document_is_rejected() {
    let (pipeline, _dir) = pipeline_with(Arc::new(MockEmbedder::new(DIM)), 100, 0, 2).await;
    let document = Document::new("blank.txt", DocumentKind::Text, "  \n ");
    assert!(matches!(
        pipeline.ingest(&document).await,
        Err(DobbError::Validation(_))
    ));
}
