//! In-process MCP server for client tests

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

use crate::Result;
use crate::mcp::manager::Connector;
use crate::mcp::transport::{StreamTransport, Transport};

type Handler = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// Recorded `tools/call` requests as `(tool, arguments)`
pub(crate) type Calls = Arc<Mutex<Vec<(String, Value)>>>;

/// Connector whose server offers `tools` and answers every call with
/// whatever `handler` returns as the `tools/call` result
pub(crate) struct FakeConnector {
    tools: Vec<String>,
    handler: Handler,
    calls: Calls,
}

impl FakeConnector {
    pub(crate) fn new(
        tools: &[&str],
        handler: impl Fn(&str, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            tools: tools.iter().map(|name| name.to_string()).collect(),
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn calls(&self) -> Calls {
        Arc::clone(&self.calls)
    }
}

/// Tool result carrying `value` as JSON text
pub(crate) fn text_result(value: &Value) -> Value {
    json!({ "content": [{ "type": "text", "text": value.to_string() }] })
}

/// Last recorded call
pub(crate) fn last_call(calls: &Calls) -> (String, Value) {
    calls
        .lock()
        .expect("calls lock")
        .last()
        .cloned()
        .expect("a tool should have been called")
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self) -> Result<Box<dyn Transport>> {
        let (client_io, server_io) = duplex(64 * 1024);
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|name| json!({ "name": name, "inputSchema": { "type": "object" } }))
            .collect();
        let handler = Arc::clone(&self.handler);
        let calls = Arc::clone(&self.calls);

        tokio::spawn(async move {
            let (server_read, mut server_write) = tokio::io::split(server_io);
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame: Value = serde_json::from_str(&line).expect("frame should be JSON");
                let result = match frame["method"].as_str() {
                    Some("initialize") => json!({
                        "protocolVersion": "2025-06-18",
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "fake", "version": "0" }
                    }),
                    Some("tools/list") => json!({ "tools": tools }),
                    Some("tools/call") => {
                        let name = frame["params"]["name"].as_str().unwrap_or_default();
                        let arguments = frame["params"]["arguments"].clone();
                        calls
                            .lock()
                            .expect("calls lock")
                            .push((name.to_string(), arguments.clone()));
                        handler(name, &arguments)
                    }
                    _ => continue,
                };
                let reply = json!({ "jsonrpc": "2.0", "id": frame["id"], "result": result });
                let mut bytes = serde_json::to_vec(&reply).expect("reply should serialize");
                bytes.push(b'\n');
                if server_write.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let (client_read, client_write) = tokio::io::split(client_io);
        Ok(Box::new(StreamTransport::new(
            BufReader::new(client_read),
            client_write,
        )))
    }

    fn label(&self) -> &str {
        "fake"
    }
}
