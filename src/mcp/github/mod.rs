//! GitHub through the GitHub MCP server.
//!
//! When a repository is enforced in the configuration, every call is pinned
//! to it regardless of the owner/repo the caller asks for.


use async_trait::async_trait;
use fancy_regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::config::{GithubConfig, env_value};
use crate::mcp::manager::{Connector, McpClientManager};
use crate::mcp::transport::{HttpTransport, StdioTransport, Transport};
use crate::{DobbError, Result};

static REPO_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([\w.-]+)/([\w.-]+?)(?:\.git)?/?$").expect("valid regex")
});

/// `owner/repo` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Parse `https://github.com/<owner>/<repo>[.git]`
    #[inline]
    pub fn parse_url(url: &str) -> Option<Self> {
        let captures = REPO_URL_REGEX.captures(url.trim()).ok()??;
        Some(Self {
            owner: captures.get(1)?.as_str().to_string(),
            repo: captures.get(2)?.as_str().to_string(),
        })
    }

    #[inline]
    pub fn qualifier(&self) -> String {
        format!("repo:{}/{}", self.owner, self.repo)
    }
}

/// Launches the GitHub MCP server with the token read at connect time
pub struct GithubConnector {
    config: GithubConfig,
}

impl GithubConnector {
    #[inline]
    pub fn new(config: GithubConfig) -> Self {
        Self { config }
    }

    fn token(&self) -> Result<String> {
        env_value(&self.config.token_env)
            .or_else(|| env_value("GITHUB_TOKEN"))
            .ok_or_else(|| {
                DobbError::Connection(format!(
                    "GitHub token is not set (export {} or GITHUB_TOKEN)",
                    self.config.token_env
                ))
            })
    }
}

#[async_trait]
impl Connector for GithubConnector {
    async fn open(&self) -> Result<Box<dyn Transport>> {
        let token = self.token()?;
        let server = &self.config.server;

        if let Some(url) = &server.http_url {
            let transport =
                HttpTransport::new(url, server.timeout_seconds).with_bearer_token(token);
            return Ok(Box::new(transport));
        }

        let env = vec![
            ("GITHUB_PERSONAL_ACCESS_TOKEN".to_string(), token),
            ("GITHUB_TOOLSETS".to_string(), self.config.toolsets.clone()),
            (
                "GITHUB_READ_ONLY".to_string(),
                self.config.read_only.to_string(),
            ),
        ];
        Ok(Box::new(StdioTransport::spawn(
            &server.command,
            &server.args,
            &env,
        )?))
    }

    fn label(&self) -> &str {
        "github"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.timeout_seconds)
    }
}

/// Filters for [`GithubClient::search_issues`]
#[derive(Debug, Clone, Default)]
pub struct IssueSearch {
    pub query: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub order: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub struct GithubClient {
    manager: McpClientManager,
    enforced: Option<RepoRef>,
}

impl GithubClient {
    #[inline]
    pub fn new(manager: McpClientManager, enforced: Option<RepoRef>) -> Self {
        Self { manager, enforced }
    }

    #[inline]
    pub fn from_config(config: &GithubConfig) -> Self {
        let enforced = config.repo_url.as_deref().and_then(RepoRef::parse_url);
        Self::new(
            McpClientManager::new(GithubConnector::new(config.clone())),
            enforced,
        )
    }

    #[inline]
    pub fn enforced_repo(&self) -> Option<&RepoRef> {
        self.enforced.as_ref()
    }

    #[inline]
    pub fn manager(&self) -> &McpClientManager {
        &self.manager
    }

    fn scope(&self, owner: &str, repo: &str) -> RepoRef {
        self.enforced.clone().unwrap_or_else(|| RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<Value> {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        debug!("GitHub {} {}", tool, serde_json::Value::Object(arguments.clone()));
        Ok(self.manager.invoke(tool, arguments).await?.into_value())
    }

    /// Repositories of `owner`, popular repositories, or the enforced one
    #[inline]
    pub async fn list_repositories(
        &self,
        owner: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<Value>> {
        let query = match (&self.enforced, owner) {
            (Some(enforced), _) => enforced.qualifier(),
            (None, Some(owner)) => format!("user:{}", owner),
            (None, None) => "stars:>1000".to_string(),
        };
        let data = self
            .call(
                "search_repositories",
                json!({ "query": query, "perPage": per_page }),
            )
            .await?;
        Ok(list_items(data, &["items", "repositories"]))
    }

    /// Single repository, or `None` when the search finds nothing
    #[inline]
    pub async fn get_repository(&self, owner: &str, repo: &str) -> Result<Option<Value>> {
        let scope = self.scope(owner, repo);
        let data = self
            .call(
                "search_repositories",
                json!({ "query": scope.qualifier(), "perPage": 1 }),
            )
            .await?;
        Ok(list_items(data, &["items", "repositories"]).into_iter().next())
    }

    #[inline]
    pub async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        sha: Option<&str>,
        path: Option<&str>,
        per_page: u32,
    ) -> Result<Vec<Value>> {
        let scope = self.scope(owner, repo);
        let mut arguments = json!({
            "owner": scope.owner,
            "repo": scope.repo,
            "perPage": per_page,
        });
        if let Some(sha) = sha {
            arguments["sha"] = json!(sha);
        }
        if let Some(path) = path {
            arguments["path"] = json!(path);
        }
        let data = self.call("list_commits", arguments).await?;
        Ok(list_items(data, &["items", "commits"]))
    }

    #[inline]
    pub async fn get_commit(&self, owner: &str, repo: &str, reference: &str) -> Result<Value> {
        let scope = self.scope(owner, repo);
        self.call(
            "get_commit",
            json!({ "owner": scope.owner, "repo": scope.repo, "ref": reference }),
        )
        .await
    }

    #[inline]
    pub async fn search_issues(&self, search: IssueSearch) -> Result<Vec<Value>> {
        let (query, owner, repo) = match &self.enforced {
            Some(enforced) => {
                let qualifier = enforced.qualifier();
                let query = if search.query.contains(&qualifier) {
                    search.query
                } else {
                    format!("{} {}", qualifier, search.query).trim().to_string()
                };
                (
                    query,
                    Some(enforced.owner.clone()),
                    Some(enforced.repo.clone()),
                )
            }
            None => (search.query, search.owner, search.repo),
        };

        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!(query));
        let optional = [
            ("owner", owner.map(Value::from)),
            ("repo", repo.map(Value::from)),
            ("order", search.order.map(Value::from)),
            ("sort", search.sort.map(Value::from)),
            ("page", search.page.map(Value::from)),
            ("perPage", search.per_page.map(Value::from)),
        ];
        for (key, value) in optional
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
        {
            arguments.insert(key.to_string(), value);
        }

        let data = self.call("search_issues", Value::Object(arguments)).await?;
        Ok(list_items(data, &["items", "issues"]))
    }
}

/// A bare array, or the first array found under one of `keys`
fn list_items(data: Value, keys: &[&str]) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(mut object) => keys
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(Value::Array(items)) if !items.is_empty() => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
