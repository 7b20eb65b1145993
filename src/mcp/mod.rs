//! MCP (Model Context Protocol) client
//!
//! Sessions speak JSON-RPC 2.0 at protocol version 2025-06-18 to external
//! tool servers, over a child process's stdio or streamable HTTP. GitHub and
//! Jira are the two servers this service talks to.

pub mod errors;
pub mod github;
pub mod jira;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::TransportError;
pub use github::{GithubClient, IssueSearch, RepoRef};
pub use jira::{JiraClient, NewIssue};
pub use manager::{Connector, McpClientManager, ServerConnector};
pub use session::{McpSession, SessionState, ToolOutput};
