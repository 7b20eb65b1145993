//! MCP Error Handling
//!
//! Transport-level failures and their mapping onto the crate error taxonomy.

use thiserror::Error;

use crate::DobbError;
use crate::mcp::protocol::JsonRpcError;

/// Failures of the byte pipe to an MCP server. Any of these ends the session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by server")]
    Closed,

    #[error("Unparseable frame from server: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to start server process '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("Timed out after {0} seconds waiting for the server")]
    Timeout(u64),
}

impl From<serde_json::Error> for TransportError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

impl From<TransportError> for DobbError {
    #[inline]
    fn from(error: TransportError) -> Self {
        Self::Connection(error.to_string())
    }
}

/// A JSON-RPC error object returned for a tool call
#[inline]
pub fn tool_error(tool: &str, error: &JsonRpcError) -> DobbError {
    DobbError::ToolInvocation(format!(
        "Tool '{}' failed ({}): {}",
        tool, error.code, error.message
    ))
}
