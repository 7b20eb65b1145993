//! Byte pipes to MCP servers.
//!
//! A transport moves whole JSON-RPC frames; matching replies to requests is
//! the session's job.

mod http;
mod stdio;


use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::mcp::errors::TransportError;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

#[async_trait]
pub trait Transport: Send {
    /// Send one frame
    async fn send(&mut self, message: &Value) -> Result<(), TransportError>;

    /// Wait for the next frame from the server
    async fn receive(&mut self) -> Result<Value, TransportError>;

    /// Release the connection; further use fails
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Newline-delimited JSON over any async reader/writer pair
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    #[inline]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        debug!("MCP >> {}", json);
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Value, TransportError> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                return Err(TransportError::Closed);
            }

            let frame = self.line.trim();
            if frame.is_empty() {
                continue;
            }
            debug!("MCP << {}", frame);
            return Ok(serde_json::from_str(frame)?);
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
