//! Jira through an Atlassian MCP server.
//!
//! Servers disagree on tool names: newer ones expose `jira_*` tools with
//! snake_case arguments, older ones `search_issues`/`get_issue`/`create_issue`
//! with camelCase. The cached catalog decides which form is sent.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{JiraConfig, env_value};
use crate::mcp::manager::{Connector, McpClientManager};
use crate::mcp::protocol::Tool;
use crate::mcp::transport::{HttpTransport, StdioTransport, Transport};
use crate::{DobbError, Result};

/// Launches the Jira MCP server, in docker when an image is configured
pub struct JiraConnector {
    config: JiraConfig,
}

/// Program, arguments and environment for the server process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl JiraConnector {
    #[inline]
    pub fn new(config: JiraConfig) -> Self {
        Self { config }
    }

    /// Credentials passed to the server; all three are required
    fn credentials(&self) -> Result<Vec<(String, String)>> {
        let url = self
            .config
            .url
            .clone()
            .ok_or_else(|| DobbError::Connection("JIRA_URL is not set".to_string()))?;
        let username = self.config.username.clone().ok_or_else(|| {
            DobbError::Connection("JIRA_USERNAME/JIRA_USER_NAME is not set".to_string())
        })?;
        let token = env_value(&self.config.api_token_env).ok_or_else(|| {
            DobbError::Connection(format!("{} is not set", self.config.api_token_env))
        })?;

        Ok(vec![
            ("JIRA_URL".to_string(), url),
            ("JIRA_USERNAME".to_string(), username),
            ("JIRA_API_TOKEN".to_string(), token),
            (
                "JIRA_VERIFY_SSL".to_string(),
                self.config.verify_ssl.to_string(),
            ),
        ])
    }

    /// Decide how to start the server. `docker_available` is injected for tests.
    #[inline]
    pub fn launch_plan(&self, docker_available: bool) -> Result<LaunchPlan> {
        let env = self.credentials()?;

        if let Some(image) = self.config.docker_image.as_ref().filter(|_| docker_available) {
            let mut args = vec!["run".to_string(), "-i".to_string(), "--rm".to_string()];
            for (name, _) in &env {
                args.push("-e".to_string());
                args.push(name.clone());
            }
            args.push(image.clone());
            return Ok(LaunchPlan {
                command: "docker".to_string(),
                args,
                env,
            });
        }

        Ok(LaunchPlan {
            command: self.config.server.command.clone(),
            args: self.config.server.args.clone(),
            env,
        })
    }
}

/// True when `program` resolves to a file on `PATH`
fn on_path(program: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| {
            let candidate = dir.join(program);
            candidate.is_file() || candidate.with_extension("exe").is_file()
        })
    })
}

#[async_trait]
impl Connector for JiraConnector {
    async fn open(&self) -> Result<Box<dyn Transport>> {
        if let Some(url) = &self.config.server.http_url {
            return Ok(Box::new(HttpTransport::new(
                url,
                self.config.server.timeout_seconds,
            )));
        }

        let plan = self.launch_plan(on_path("docker"))?;
        info!("Launching Jira MCP server via {}", plan.command);
        Ok(Box::new(StdioTransport::spawn(
            &plan.command,
            &plan.args,
            &plan.env,
        )?))
    }

    fn label(&self) -> &str {
        "jira"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.timeout_seconds)
    }
}

/// Fields of a new issue
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub project_key: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
}

pub struct JiraClient {
    manager: McpClientManager,
}

impl JiraClient {
    #[inline]
    pub fn new(manager: McpClientManager) -> Self {
        Self { manager }
    }

    #[inline]
    pub fn from_config(config: &JiraConfig) -> Self {
        Self::new(McpClientManager::new(JiraConnector::new(config.clone())))
    }

    #[inline]
    pub fn manager(&self) -> &McpClientManager {
        &self.manager
    }

    #[inline]
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.manager.list_tools().await
    }

    /// Invoke any tool the server offers
    #[inline]
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Value> {
        debug!("Jira {} {}", name, serde_json::Value::Object(arguments.clone()));
        Ok(self.manager.invoke(name, arguments).await?.into_value())
    }

    /// `modern` when the server has it, else `legacy`
    async fn pick_tool<'a>(&self, modern: &'a str, legacy: &'a str) -> Result<&'a str> {
        Ok(if self.manager.has_tool(modern).await? {
            modern
        } else {
            legacy
        })
    }

    #[inline]
    pub async fn search_issues(&self, jql: &str, limit: u32) -> Result<Value> {
        let tool = self.pick_tool("jira_search", "search_issues").await?;
        let arguments = if tool == "jira_search" {
            json!({ "jql": jql, "limit": limit })
        } else {
            json!({ "jql": jql, "maxResults": limit })
        };
        self.call_tool(tool, into_map(arguments)).await
    }

    #[inline]
    pub async fn get_issue(&self, key: &str) -> Result<Value> {
        let tool = self.pick_tool("jira_get_issue", "get_issue").await?;
        let arguments = if tool == "jira_get_issue" {
            json!({ "issue_key": key })
        } else {
            json!({ "key": key })
        };
        self.call_tool(tool, into_map(arguments)).await
    }

    #[inline]
    pub async fn create_issue(&self, issue: NewIssue) -> Result<Value> {
        let tool = self.pick_tool("jira_create_issue", "create_issue").await?;
        let arguments = if tool == "jira_create_issue" {
            json!({
                "project_key": issue.project_key,
                "summary": issue.summary,
                "description": issue.description,
                "issue_type": issue.issue_type,
            })
        } else {
            json!({
                "projectKey": issue.project_key,
                "summary": issue.summary,
                "description": issue.description,
                "issueType": issue.issue_type,
            })
        };
        self.call_tool(tool, into_map(arguments)).await
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
