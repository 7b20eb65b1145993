use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::{StreamTransport, Transport};
use crate::mcp::errors::TransportError;

/// MCP server running as a child process, speaking JSON-RPC on stdin/stdout
pub struct StdioTransport {
    child: Child,
    stream: StreamTransport<BufReader<ChildStdout>, ChildStdin>,
}

impl StdioTransport {
    /// Spawn `command` with `args`, adding `env` to the inherited environment.
    /// The process is killed when the transport is dropped.
    #[inline]
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<Self, TransportError> {
        info!("Starting MCP server: {} {}", command, args.join(" "));

        let mut child = Command::new(command)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Spawn {
            command: command.to_string(),
            message: "stdin was not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Spawn {
            command: command.to_string(),
            message: "stdout was not captured".to_string(),
        })?;

        Ok(Self {
            child,
            stream: StreamTransport::new(BufReader::new(stdout), stdin),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        self.stream.send(message).await
    }

    async fn receive(&mut self) -> Result<Value, TransportError> {
        self.stream.receive().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Err(e) = self.stream.close().await {
            debug!("Closing server stdin failed: {}", e);
        }
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop MCP server process: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
