use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::Transport;
use crate::mcp::errors::TransportError;

const SESSION_HEADER: &str = "mcp-session-id";

/// MCP over streamable HTTP: every frame is POSTed, replies come back in the
/// response body as JSON or as server-sent events.
pub struct HttpTransport {
    endpoint: String,
    agent: ureq::Agent,
    bearer_token: Option<String>,
    session_id: Option<String>,
    pending: VecDeque<Value>,
    closed: bool,
}

impl HttpTransport {
    #[inline]
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            endpoint: endpoint.to_string(),
            agent,
            bearer_token: None,
            session_id: None,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    #[inline]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

struct PostOutcome {
    session_id: Option<String>,
    frames: Vec<Value>,
}

fn post_frame(
    agent: &ureq::Agent,
    endpoint: &str,
    bearer_token: Option<&str>,
    session_id: Option<&str>,
    body: &str,
) -> Result<PostOutcome, TransportError> {
    let mut request = agent
        .post(endpoint)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json, text/event-stream");
    if let Some(token) = bearer_token {
        request = request.header("Authorization", format!("Bearer {}", token));
    }
    if let Some(id) = session_id {
        request = request.header(SESSION_HEADER, id);
    }

    let mut response = request
        .send(body)
        .map_err(|e| TransportError::Http(format!("POST {} failed: {}", endpoint, e)))?;

    let status = response.status();
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let is_event_stream = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));

    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| TransportError::Http(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(TransportError::Http(format!(
            "Server answered {}: {}",
            status,
            text.trim()
        )));
    }

    let frames = if text.trim().is_empty() {
        Vec::new()
    } else if is_event_stream {
        parse_event_stream(&text)?
    } else {
        match serde_json::from_str(&text)? {
            Value::Array(batch) => batch,
            single => vec![single],
        }
    };

    Ok(PostOutcome { session_id, frames })
}

/// Collect the JSON payload of every `data:` event in an SSE body
pub(crate) fn parse_event_stream(body: &str) -> Result<Vec<Value>, TransportError> {
    let mut frames = Vec::new();
    let mut data = String::new();

    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if !data.is_empty() {
                frames.push(serde_json::from_str(&data)?);
                data.clear();
            }
        } else if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
        }
    }

    Ok(frames)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let body = serde_json::to_string(message)?;
        debug!("MCP >> {} {}", self.endpoint, body);

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let bearer_token = self.bearer_token.clone();
        let session_id = self.session_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            post_frame(
                &agent,
                &endpoint,
                bearer_token.as_deref(),
                session_id.as_deref(),
                &body,
            )
        })
        .await
        .map_err(|e| TransportError::Http(format!("HTTP task failed: {}", e)))??;

        if outcome.session_id.is_some() {
            self.session_id = outcome.session_id;
        }
        self.pending.extend(outcome.frames);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Value, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.pending.pop_front().ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.pending.clear();

        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let bearer_token = self.bearer_token.clone();
        // Session termination is best-effort
        let outcome = tokio::task::spawn_blocking(move || {
            let mut request = agent.delete(&endpoint).header(SESSION_HEADER, &session_id);
            if let Some(token) = bearer_token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            request.call()
        })
        .await;
        match outcome {
            Ok(Ok(response)) if !response.status().is_success() => {
                debug!("Ending MCP session answered {}", response.status());
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Ending MCP session failed: {}", e),
            Err(e) => debug!("MCP session cleanup task failed: {}", e),
        }
        Ok(())
    }
}
