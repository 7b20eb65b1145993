use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::documents::{Document, DocumentKind};
use crate::rag::{IngestReport, RetrievedChunk};

const MAX_RESULTS: usize = 100;

#[derive(Debug, Serialize)]
pub(super) struct IngestResponse {
    filename: String,
    #[serde(flatten)]
    report: IngestReport,
}

#[derive(Debug, Deserialize)]
pub(super) struct QueryRequest {
    query: String,
    #[serde(default = "default_k")]
    k: usize,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub(super) struct QueryResponse {
    query: String,
    results: Vec<RetrievedChunk>,
}

/// File name and contents of the `file` field
async fn read_upload(mut multipart: Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no name".to_string()))?;
        let bytes = field.bytes().await?;
        return Ok((file_name, bytes));
    }
    Err(ApiError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}

async fn ingest_upload(
    state: AppState,
    multipart: Multipart,
    kind: DocumentKind,
) -> Result<Json<IngestResponse>, ApiError> {
    let (file_name, bytes) = read_upload(multipart).await?;
    if DocumentKind::from_file_name(&file_name) != Some(kind) {
        return Err(ApiError::BadRequest(match kind {
            DocumentKind::Text => "Only .txt files are supported".to_string(),
            DocumentKind::Pdf => "Only .pdf files are supported".to_string(),
            DocumentKind::Docx => "Only .docx files are supported".to_string(),
        }));
    }
    info!("Received {} ({} bytes)", file_name, bytes.len());

    let source = file_name.clone();
    let document =
        tokio::task::spawn_blocking(move || Document::from_bytes(&source, kind, &bytes))
            .await
            .map_err(|e| crate::DobbError::Other(e.into()))??;

    let report = state.pipeline.ingest(&document).await?;
    Ok(Json(IngestResponse {
        filename: file_name,
        report,
    }))
}

pub(super) async fn ingest_text(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    ingest_upload(state, multipart, DocumentKind::Text).await
}

pub(super) async fn ingest_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    ingest_upload(state, multipart, DocumentKind::Pdf).await
}

pub(super) async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload?;
    if !(1..=MAX_RESULTS).contains(&request.k) {
        return Err(ApiError::BadRequest(format!(
            "k must be between 1 and {}",
            MAX_RESULTS
        )));
    }
    let results = state.pipeline.query(&request.query, request.k).await?;
    Ok(Json(QueryResponse {
        query: request.query,
        results,
    }))
}
