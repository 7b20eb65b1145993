use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::DobbError;

/// Anything a handler can fail with, rendered as
/// `{"error": <kind>, "message": ..., ["chunks_stored": n]}`
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] DobbError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Service(error) => match error {
                DobbError::Validation(_) => StatusCode::BAD_REQUEST,
                DobbError::Upstream(_) | DobbError::ToolInvocation(_) => StatusCode::BAD_GATEWAY,
                DobbError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                DobbError::EmbeddingService { .. }
                | DobbError::Config(_)
                | DobbError::Database(_)
                | DobbError::Io(_)
                | DobbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(error) => error.kind(),
            Self::BadRequest(_) => "validation_error",
            Self::NotFound(_) => "not_found",
        }
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    #[inline]
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    #[inline]
    fn from(error: MultipartError) -> Self {
        Self::BadRequest(format!("Invalid multipart upload: {}", error.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Service(error) => match error {
                DobbError::Validation(m)
                | DobbError::Upstream(m)
                | DobbError::Connection(m)
                | DobbError::ToolInvocation(m)
                | DobbError::Config(m)
                | DobbError::Database(m) => m.clone(),
                DobbError::EmbeddingService { message, .. } => message.clone(),
                other => other.to_string(),
            },
            Self::BadRequest(m) | Self::NotFound(m) => m.clone(),
        };

        if status.is_server_error() {
            error!("{} ({}): {}", status, self.kind(), message);
        } else {
            warn!("{} ({}): {}", status, self.kind(), message);
        }

        let mut body = json!({ "error": self.kind(), "message": message });
        if let Self::Service(DobbError::EmbeddingService { chunks_stored, .. }) = &self {
            body["chunks_stored"] = json!(chunks_stored);
        }
        (status, Json(body)).into_response()
    }
}
