//! Owns the session for one MCP server and replaces it once it is lost.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::Result;
use crate::config::McpServerConfig;
use crate::mcp::protocol::Tool;
use crate::mcp::session::{McpSession, ToolOutput};
use crate::mcp::transport::{HttpTransport, StdioTransport, Transport};

/// Opens a fresh transport to a particular server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Transport>>;

    /// Short name used in logs and error messages
    fn label(&self) -> &str;

    /// Upper bound for one request/reply exchange
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// Spawns the configured command, or dials `http_url` when one is set
pub struct ServerConnector {
    label: String,
    server: McpServerConfig,
    env: Vec<(String, String)>,
}

impl ServerConnector {
    #[inline]
    pub fn new(label: &str, server: McpServerConfig, env: Vec<(String, String)>) -> Self {
        Self {
            label: label.to_string(),
            server,
            env,
        }
    }
}

#[async_trait]
impl Connector for ServerConnector {
    async fn open(&self) -> Result<Box<dyn Transport>> {
        if let Some(url) = &self.server.http_url {
            return Ok(Box::new(HttpTransport::new(url, self.server.timeout_seconds)));
        }
        let transport = StdioTransport::spawn(&self.server.command, &self.server.args, &self.env)?;
        Ok(Box::new(transport))
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_seconds)
    }
}

/// Lazily connected, self-healing handle to one MCP server.
///
/// The first call connects. A call that finds the current session closed
/// opens a new one; the call that observed the failure is not retried.
pub struct McpClientManager {
    connector: Box<dyn Connector>,
    session: Mutex<Option<Arc<McpSession>>>,
}

impl McpClientManager {
    #[inline]
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            session: Mutex::new(None),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        self.connector.label()
    }

    /// Current usable session, connecting first when there is none
    #[inline]
    pub async fn session(&self) -> Result<Arc<McpSession>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref().filter(|session| session.is_usable()) {
            return Ok(Arc::clone(session));
        }

        if slot.take().is_some() {
            info!("Reconnecting to the {} MCP server", self.label());
        }
        let transport = self.connector.open().await?;
        let session = Arc::new(McpSession::new(
            self.label(),
            transport,
            self.connector.timeout(),
        ));
        session.connect().await?;
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    #[inline]
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.session().await?.list_tools()
    }

    #[inline]
    pub async fn has_tool(&self, name: &str) -> Result<bool> {
        Ok(self.session().await?.has_tool(name))
    }

    #[inline]
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let session = self.session().await?;
        session.invoke(name, arguments).await
    }

    /// Close the current session, if any. The next call reconnects.
    #[inline]
    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }
}
