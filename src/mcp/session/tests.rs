use super::*;
use crate::mcp::transport::StreamTransport;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

type Seen = Arc<std::sync::Mutex<Vec<String>>>;

fn tool_page(cursor: Option<&str>) -> Value {
    match cursor {
        None => json!({
            "tools": [
                {
                    "name": "echo",
                    "description": "Echo a message back",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "message": { "type": "string" } },
                        "required": ["message"]
                    }
                },
                { "name": "fail", "inputSchema": { "type": "object" } }
            ],
            "nextCursor": "page-2"
        }),
        Some(_) => json!({
            "tools": [
                { "name": "rpc_error", "inputSchema": { "type": "object" } },
                { "name": "crash" }
            ]
        }),
    }
}

/// In-process MCP server on the far side of a duplex pipe
fn fake_server_session() -> (McpSession, Seen) {
    let (client_io, server_io) = duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let transport = StreamTransport::new(BufReader::new(client_read), client_write);
    let seen: Seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        let (server_read, mut server_write) = tokio::io::split(server_io);
        let mut lines = BufReader::new(server_read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let frame: Value = serde_json::from_str(&line).expect("client frames should be JSON");
            let Some(method) = frame["method"].as_str() else {
                continue;
            };
            log.lock().expect("log lock").push(method.to_string());
            let id = frame["id"].clone();

            let reply = match method {
                "initialize" => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": MCP_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "fake", "version": "0.0.1" }
                    }
                }),
                "tools/list" => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": tool_page(frame["params"]["cursor"].as_str())
                }),
                "tools/call" => match frame["params"]["name"].as_str() {
                    Some("echo") => {
                        let chatter = "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\
                                       {\"jsonrpc\":\"2.0\",\"id\":\"srv-1\",\"method\":\"ping\"}\n";
                        server_write
                            .write_all(chatter.as_bytes())
                            .await
                            .expect("server should write");
                        let pong = lines
                            .next_line()
                            .await
                            .expect("server should read")
                            .expect("client should answer the ping");
                        let pong: Value = serde_json::from_str(&pong).expect("pong should be JSON");
                        log.lock()
                            .expect("log lock")
                            .push(format!("reply:{}", pong["id"].as_str().unwrap_or_default()));
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "content": [{
                                    "type": "text",
                                    "text": frame["params"]["arguments"]["message"]
                                }]
                            }
                        })
                    }
                    Some("fail") => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "content": [{ "type": "text", "text": "boom" }],
                            "isError": true
                        }
                    }),
                    Some("rpc_error") => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32602, "message": "bad params" }
                    }),
                    _ => break,
                },
                _ => continue,
            };

            let mut bytes = serde_json::to_vec(&reply).expect("reply should serialize");
            bytes.push(b'\n');
            server_write.write_all(&bytes).await.expect("server should write");
        }
    });

    (
        McpSession::new("fake", Box::new(transport), Duration::from_secs(5)),
        seen,
    )
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("arguments should be an object")
}

fn seen_methods(seen: &Seen) -> Vec<String> {
    seen.lock().expect("log lock").clone()
}

#[tokio::test]
async fn connect_performs_handshake_and_pages_through_tools() {
    let (session, seen) = fake_server_session();
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect().await.expect("connect should succeed");

    assert_eq!(session.state(), SessionState::Ready);
    let names: Vec<String> = session
        .list_tools()
        .expect("tools should be listed")
        .into_iter()
        .map(|tool| tool.name)
        .collect();
    assert_eq!(names, vec!["echo", "fail", "rpc_error", "crash"]);
    assert!(session.has_tool("crash"));
    assert!(!session.has_tool("missing"));
    assert_eq!(
        seen_methods(&seen),
        vec![
            "initialize",
            "notifications/initialized",
            "tools/list",
            "tools/list"
        ]
    );
}

#[tokio::test]
async fn invoke_returns_content_and_answers_server_pings() {
    let (session, seen) = fake_server_session();
    session.connect().await.expect("connect should succeed");

    let output = session
        .invoke("echo", args(json!({ "message": "hello" })))
        .await
        .expect("echo should succeed");

    assert_eq!(output.first_text(), Some("hello"));
    assert_eq!(session.state(), SessionState::Ready);
    assert!(seen_methods(&seen).contains(&"reply:srv-1".to_string()));
}

#[tokio::test]
async fn invalid_calls_never_reach_the_server() {
    let (session, seen) = fake_server_session();
    session.connect().await.expect("connect should succeed");

    let missing_argument = session.invoke("echo", Map::new()).await;
    assert!(matches!(missing_argument, Err(DobbError::Validation(ref m)) if m.contains("message")));

    let wrong_type = session.invoke("echo", args(json!({ "message": 7 }))).await;
    assert!(matches!(wrong_type, Err(DobbError::Validation(_))));

    let unknown = session.invoke("does_not_exist", Map::new()).await;
    assert!(matches!(unknown, Err(DobbError::Validation(ref m)) if m.contains("Unknown tool")));

    assert!(!seen_methods(&seen).contains(&"tools/call".to_string()));
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn tool_failures_keep_the_session_usable() {
    let (session, _seen) = fake_server_session();
    session.connect().await.expect("connect should succeed");

    let reported = session.invoke("fail", Map::new()).await;
    assert!(matches!(reported, Err(DobbError::ToolInvocation(ref m)) if m.contains("boom")));
    assert_eq!(session.state(), SessionState::Ready);

    let rejected = session.invoke("rpc_error", Map::new()).await;
    assert!(matches!(rejected, Err(DobbError::ToolInvocation(ref m)) if m.contains("bad params")));
    assert_eq!(session.state(), SessionState::Ready);

    let output = session
        .invoke("echo", args(json!({ "message": "still here" })))
        .await
        .expect("session should keep working");
    assert_eq!(output.first_text(), Some("still here"));
}

#[tokio::test]
async fn lost_connection_closes_the_session_for_good() {
    let (session, _seen) = fake_server_session();
    session.connect().await.expect("connect should succeed");

    let lost = session.invoke("crash", Map::new()).await;
    assert!(matches!(lost, Err(DobbError::Connection(_))));
    assert_eq!(session.state(), SessionState::Closed);

    let after = session
        .invoke("echo", args(json!({ "message": "anyone?" })))
        .await;
    assert!(matches!(after, Err(DobbError::Connection(_))));
    assert!(matches!(session.list_tools(), Err(DobbError::Connection(_))));
    assert!(matches!(session.connect().await, Err(DobbError::Connection(_))));
}

#[tokio::test]
async fn invoke_requires_a_connected_session() {
    let (session, _seen) = fake_server_session();
    let result = session
        .invoke("echo", args(json!({ "message": "early" })))
        .await;
    assert!(matches!(result, Err(DobbError::Connection(_))));
}

#[tokio::test]
async fn failed_handshake_leaves_session_disconnected() {
    let (client_io, server_io) = duplex(1024);
    drop(server_io);
    let (client_read, client_write) = tokio::io::split(client_io);
    let transport = StreamTransport::new(BufReader::new(client_read), client_write);
    let session = McpSession::new("gone", Box::new(transport), Duration::from_secs(1));

    let result = session.connect().await;

    assert!(matches!(result, Err(DobbError::Connection(ref m)) if m.contains("gone")));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn close_is_idempotent() {
    let (session, _seen) = fake_server_session();
    session.connect().await.expect("connect should succeed");

    session.close().await;
    session.close().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_usable());
}

/// Answers every request in-process and records how many are outstanding
struct CountingTransport {
    queue: VecDeque<Value>,
    outstanding: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(&mut self, message: &Value) -> std::result::Result<(), TransportError> {
        let Some(method) = message["method"].as_str() else {
            return Ok(());
        };
        if message.get("id").is_none() {
            return Ok(());
        }
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = match method {
            "initialize" => json!({
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "serverInfo": { "name": "counting", "version": "1" }
            }),
            "tools/list" => json!({ "tools": [{ "name": "slow" }] }),
            _ => json!({ "content": [{ "type": "text", "text": "done" }] }),
        };
        self.queue
            .push_back(json!({ "jsonrpc": "2.0", "id": message["id"], "result": result }));
        Ok(())
    }

    async fn receive(&mut self) -> std::result::Result<Value, TransportError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frame = self.queue.pop_front().ok_or(TransportError::Closed)?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Ok(frame)
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_invocations_are_serialized() {
    let outstanding = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let transport = CountingTransport {
        queue: VecDeque::new(),
        outstanding: Arc::clone(&outstanding),
        peak: Arc::clone(&peak),
    };
    let session = Arc::new(McpSession::new(
        "counting",
        Box::new(transport),
        Duration::from_secs(5),
    ));
    session.connect().await.expect("connect should succeed");

    let calls: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.invoke("slow", Map::new()).await })
        })
        .collect();
    for call in calls {
        let output = call
            .await
            .expect("task should not panic")
            .expect("invoke should succeed");
        assert_eq!(output.first_text(), Some("done"));
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(outstanding.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn tool_output_prefers_structured_then_json_text() {
    let structured = ToolOutput {
        content: vec![ToolContent::Text {
            text: "ignored".to_string(),
        }],
        structured: Some(json!({ "total": 2 })),
    };
    assert_eq!(structured.into_value(), json!({ "total": 2 }));

    let json_text = ToolOutput {
        content: vec![ToolContent::Text {
            text: "[{\"key\": \"PROJ-1\"}]".to_string(),
        }],
        structured: None,
    };
    assert_eq!(json_text.into_value(), json!([{ "key": "PROJ-1" }]));

    let plain = ToolOutput {
        content: vec![ToolContent::Text {
            text: "no results".to_string(),
        }],
        structured: None,
    };
    assert_eq!(plain.into_value(), json!("no results"));
}

/// Completes the handshake, then answers `tools/call` with a fixed frame or
/// not at all
struct StalledTransport {
    queue: VecDeque<Value>,
    call_reply: Option<Value>,
}

impl StalledTransport {
    fn session(call_reply: Option<Value>) -> McpSession {
        let transport = Self {
            queue: VecDeque::new(),
            call_reply,
        };
        McpSession::new("stalled", Box::new(transport), Duration::from_secs(30))
    }
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&mut self, message: &Value) -> std::result::Result<(), TransportError> {
        let result = match message["method"].as_str() {
            Some("initialize") => json!({
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "serverInfo": { "name": "stalled", "version": "1" }
            }),
            Some("tools/list") => json!({ "tools": [{ "name": "hang" }] }),
            Some("tools/call") => {
                if let Some(reply) = &self.call_reply {
                    self.queue.push_back(reply.clone());
                }
                return Ok(());
            }
            _ => return Ok(()),
        };
        self.queue
            .push_back(json!({ "jsonrpc": "2.0", "id": message["id"], "result": result }));
        Ok(())
    }

    async fn receive(&mut self) -> std::result::Result<Value, TransportError> {
        match self.queue.pop_front() {
            Some(frame) => Ok(frame),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn cancelled_invocation_closes_the_session() {
    let session = Arc::new(StalledTransport::session(None));
    session.connect().await.expect("connect should succeed");

    let call = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.invoke("hang", Map::new()).await })
    };
    while session.state() != SessionState::Invoking {
        tokio::task::yield_now().await;
    }
    call.abort();
    let joined = call.await;
    assert!(joined.is_err_and(|e| e.is_cancelled()));

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_usable());
    let after = session.invoke("hang", Map::new()).await;
    assert!(matches!(after, Err(DobbError::Connection(_))));
}

#[tokio::test]
async fn error_reply_without_id_answers_the_pending_call() {
    let null_id_error = json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": -32700, "message": "Parse error" }
    });
    let session = StalledTransport::session(Some(null_id_error));
    session.connect().await.expect("connect should succeed");

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        session.invoke("hang", Map::new()),
    )
    .await
    .expect("reply should arrive before the session timeout");

    assert!(matches!(result, Err(DobbError::ToolInvocation(ref m)) if m.contains("Parse error")));
    assert_eq!(session.state(), SessionState::Ready);
}
