//! One live connection to an MCP server.
//!
//! `Disconnected -> Connecting -> Ready -> (Invoking -> Ready)* -> Closed`.
//! A session never reconnects; the manager replaces closed sessions.

#[cfg(test)]
mod tests;

use serde_json::{Map, Value};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::mcp::errors::{TransportError, tool_error};
use crate::mcp::protocol::*;
use crate::mcp::transport::Transport;
use crate::mcp::validation::ToolValidator;
use crate::{DobbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Ready = 2,
    Invoking = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::Invoking,
            _ => Self::Closed,
        }
    }
}

/// Successful result of a tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub structured: Option<Value>,
}

impl ToolOutput {
    /// First text item, if any
    #[inline]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|item| match item {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Plain data view: structured content, else the first text item parsed as
    /// JSON, else that text as a string, else the raw content list.
    #[inline]
    pub fn into_value(self) -> Value {
        if let Some(structured) = self.structured {
            return structured;
        }
        if let Some(text) = self.first_text() {
            return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
        }
        serde_json::to_value(&self.content).unwrap_or(Value::Null)
    }
}

struct ToolCatalog {
    tools: Vec<Tool>,
    validator: ToolValidator,
}

pub struct McpSession {
    label: String,
    timeout: Duration,
    state: AtomicU8,
    next_id: AtomicI64,
    /// Held across send and receive, so one request is in flight at a time
    transport: Mutex<Box<dyn Transport>>,
    catalog: OnceLock<ToolCatalog>,
}

impl McpSession {
    #[inline]
    pub fn new(label: impl Into<String>, transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            timeout,
            state: AtomicU8::new(SessionState::Disconnected as u8),
            next_id: AtomicI64::new(1),
            transport: Mutex::new(transport),
            catalog: OnceLock::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// True when the session can accept invocations
    #[inline]
    pub fn is_usable(&self) -> bool {
        matches!(self.state(), SessionState::Ready | SessionState::Invoking)
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Handshake and discover tools. Only valid from `Disconnected`.
    #[inline]
    pub async fn connect(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                SessionState::Disconnected as u8,
                SessionState::Connecting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return match self.state() {
                SessionState::Ready | SessionState::Invoking => Ok(()),
                other => Err(DobbError::Connection(format!(
                    "{} session cannot connect from state {:?}",
                    self.label, other
                ))),
            };
        }

        let mut transport = self.transport.lock().await;
        let guard = StateGuard::new(self, SessionState::Closed);
        let outcome = self.handshake(transport.as_mut()).await;
        guard.disarm();
        match outcome {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!("{} MCP handshake failed: {}", self.label, e);
                if let Err(close_error) = transport.close().await {
                    debug!("Closing failed transport: {}", close_error);
                }
                self.set_state(SessionState::Disconnected);
                Err(DobbError::Connection(format!(
                    "Failed to connect to {} MCP server: {}",
                    self.label, e
                )))
            }
        }
    }

    async fn handshake(
        &self,
        transport: &mut dyn Transport,
    ) -> std::result::Result<(), TransportError> {
        let params = InitializeParams {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let response = self
            .request(transport, "initialize", Some(serde_json::to_value(params)?))
            .await?;
        let result: InitializeResult =
            serde_json::from_value(expect_result(response, "initialize")?)?;
        info!(
            "Connected to {} MCP server {} {} (protocol {})",
            self.label, result.server_info.name, result.server_info.version, result.protocol_version
        );

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        transport.send(&serde_json::to_value(notification)?).await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let response = self.request(transport, "tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(expect_result(response, "tools/list")?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(
            "{} MCP server offers {} tools: {}",
            self.label,
            tools.len(),
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let validator = ToolValidator::new(&tools);
        let _ = self.catalog.set(ToolCatalog { tools, validator });
        Ok(())
    }

    /// Cached tool descriptors from the handshake
    #[inline]
    pub fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_usable()?;
        Ok(self.catalog().map(|c| c.tools.clone()).unwrap_or_default())
    }

    #[inline]
    pub fn has_tool(&self, name: &str) -> bool {
        self.catalog()
            .is_some_and(|c| c.tools.iter().any(|tool| tool.name == name))
    }

    fn catalog(&self) -> Option<&ToolCatalog> {
        self.catalog.get()
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.is_usable() {
            Ok(())
        } else {
            Err(DobbError::Connection(format!(
                "{} MCP session is {:?}",
                self.label,
                self.state()
            )))
        }
    }

    /// Call a tool by name.
    ///
    /// Unknown tools and arguments that fail the tool's schema are rejected
    /// without contacting the server. Tool-reported failures keep the session
    /// usable; transport failures close it.
    #[inline]
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        self.ensure_usable()?;
        let catalog = self.catalog().ok_or_else(|| {
            DobbError::Connection(format!("{} MCP session has no tool catalog", self.label))
        })?;

        if !catalog.tools.iter().any(|tool| tool.name == name) {
            return Err(DobbError::Validation(format!(
                "Unknown tool '{}' on the {} MCP server",
                name, self.label
            )));
        }
        catalog.validator.validate(name, &arguments)?;
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| DobbError::Validation(format!("Unserializable tool arguments: {}", e)))?;

        let mut transport = self.transport.lock().await;
        // The session may have closed while this call waited for its turn
        self.ensure_usable()?;
        self.set_state(SessionState::Invoking);
        debug!("Invoking {} tool '{}'", self.label, name);

        // A call dropped before its reply leaves the stream mid-exchange
        let guard = StateGuard::new(self, SessionState::Closed);
        let outcome = self.request(transport.as_mut(), "tools/call", Some(params)).await;
        guard.disarm();

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!("{} MCP transport failed during '{}': {}", self.label, name, e);
                if let Err(close_error) = transport.close().await {
                    debug!("Closing failed transport: {}", close_error);
                }
                self.set_state(SessionState::Closed);
                return Err(DobbError::Connection(format!(
                    "{} MCP connection lost while calling '{}': {}",
                    self.label, name, e
                )));
            }
        };
        self.set_state(SessionState::Ready);

        if let Some(error) = response.error {
            return Err(tool_error(name, &error));
        }
        let result: CallToolResult = serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| {
                DobbError::ToolInvocation(format!(
                    "Tool '{}' returned a malformed result: {}",
                    name, e
                ))
            })?;

        if result.is_error.unwrap_or(false) {
            let message = result.text();
            return Err(DobbError::ToolInvocation(format!(
                "Tool '{}' reported an error: {}",
                name,
                if message.is_empty() { "no details" } else { message.as_str() }
            )));
        }

        Ok(ToolOutput {
            content: result.content,
            structured: result.structured_content,
        })
    }

    /// Close the connection. Idempotent.
    #[inline]
    pub async fn close(&self) {
        let mut transport = self.transport.lock().await;
        if self.state() == SessionState::Closed {
            return;
        }
        self.set_state(SessionState::Closed);
        if let Err(e) = transport.close().await {
            debug!("Error closing {} MCP transport: {}", self.label, e);
        }
        info!("Closed {} MCP session", self.label);
    }

    /// Send a request and wait for its reply, answering server pings meanwhile
    async fn request(
        &self,
        transport: &mut dyn Transport,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(method, params, RequestId::Number(id));
        let expected = RequestId::Number(id);

        let exchange = async {
            transport.send(&serde_json::to_value(&request)?).await?;
            loop {
                let frame = transport.receive().await?;
                match ServerMessage::classify(frame) {
                    Some(ServerMessage::Response(response))
                        if response.id.as_ref() == Some(&expected) =>
                    {
                        return Ok(response);
                    }
                    // Servers that cannot parse a request answer with `id: null`
                    Some(ServerMessage::Response(response))
                        if response.id.is_none() && response.error.is_some() =>
                    {
                        return Ok(response);
                    }
                    Some(ServerMessage::Response(response)) => {
                        warn!("Ignoring reply to unknown request {:?}", response.id);
                    }
                    Some(ServerMessage::Request(server_request)) => {
                        let reply = if server_request.method == "ping" {
                            JsonRpcResponse::success(server_request.id, Value::Object(Map::new()))
                        } else {
                            JsonRpcResponse::failure(
                                server_request.id,
                                JsonRpcError::method_not_found(&server_request.method),
                            )
                        };
                        transport.send(&serde_json::to_value(reply)?).await?;
                    }
                    Some(ServerMessage::Notification(notification)) => {
                        debug!("{} MCP notification: {}", self.label, notification.method);
                    }
                    None => {
                        return Err(TransportError::Parse(
                            "frame is not a JSON-RPC message".to_string(),
                        ));
                    }
                }
            }
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout.as_secs()))?
    }
}

/// Moves the session to `fallback` when dropped while still armed
struct StateGuard<'a> {
    session: &'a McpSession,
    fallback: SessionState,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn new(session: &'a McpSession, fallback: SessionState) -> Self {
        Self {
            session,
            fallback,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "{} MCP exchange abandoned in state {:?}, marking {:?}",
                self.session.label,
                self.session.state(),
                self.fallback
            );
            self.session.set_state(self.fallback);
        }
    }
}

/// Turn a JSON-RPC error reply during the handshake into a transport failure
fn expect_result(
    response: JsonRpcResponse,
    method: &str,
) -> std::result::Result<Value, TransportError> {
    if let Some(error) = response.error {
        return Err(TransportError::Parse(format!(
            "{} rejected ({}): {}",
            method, error.code, error.message
        )));
    }
    Ok(response.result.unwrap_or(Value::Null))
}
