use thiserror::Error;

pub type Result<T> = std::result::Result<T, DobbError>;

#[derive(Error, Debug)]
pub enum DobbError {
    /// Caller input was rejected before any external call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An LLM or other HTTP collaborator failed or answered with garbage.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// An MCP server could not be reached, or its session was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An MCP tool ran and reported failure.
    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    /// Embedding or vector store failure; `chunks_stored` reports partial progress.
    #[error("Embedding service error: {message} ({chunks_stored} chunks stored)")]
    EmbeddingService {
        message: String,
        chunks_stored: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl DobbError {
    /// Stable machine-readable name of the error category.
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Upstream(_) => "upstream_error",
            Self::Connection(_) => "connection_error",
            Self::ToolInvocation(_) => "tool_invocation_error",
            Self::EmbeddingService { .. } => "embedding_service_error",
            Self::Config(_) => "config_error",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Rewrap a store failure as an embedding service error carrying progress.
    #[inline]
    pub fn into_embedding_service(self, chunks_stored: usize) -> Self {
        match self {
            Self::EmbeddingService { message, .. } => Self::EmbeddingService {
                message,
                chunks_stored,
            },
            other => Self::EmbeddingService {
                message: other.to_string(),
                chunks_stored,
            },
        }
    }
}

pub mod api;
pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod llm;
pub mod mcp;
pub mod rag;
pub mod report;
