#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_COLLECTION: &str = "default_collection";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Groq,
    Gemini,
}

impl LlmProvider {
    #[inline]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    #[inline]
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Overrides the provider's public endpoint
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            model: "llama-3.3-70b-versatile".to_string(),
            base_url: None,
            api_key_env: None,
            temperature: 0.3,
            max_tokens: 2048,
            timeout_seconds: 120,
        }
    }
}

impl LlmConfig {
    #[inline]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    #[inline]
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(self.base_url())
            .map_err(|_| ConfigError::InvalidUrl(self.base_url().to_string()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    /// Pinned model id, recorded on every stored vector
    pub model: String,
    pub dimension: u32,
    pub batch_size: u32,
    /// Only needed for hosted providers
    pub api_key_env: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimension: 384,
            batch_size: 16,
            api_key_env: None,
            timeout_seconds: 30,
        }
    }
}

impl EmbeddingsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(8..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    pub fn url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Defaults to `<base dir>/vectors`
    pub path: Option<PathBuf>,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    pub context_chunks: usize,
    /// Static product description prepended to every chat prompt
    pub reference_text_path: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_chunks: 3,
            reference_text_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// PRD URLs must start with this prefix when set
    pub allowed_url_prefix: Option<String>,
    pub context_chunks: usize,
    pub fetch_timeout_seconds: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            allowed_url_prefix: None,
            context_chunks: 4,
            fetch_timeout_seconds: 30,
        }
    }
}

/// How to reach an MCP server: a spawned subprocess or an HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// When set, the HTTP transport is used instead of spawning `command`
    pub http_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            args: Vec::new(),
            http_url: None,
            timeout_seconds: 60,
        }
    }
}

impl McpServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.http_url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        } else if self.command.trim().is_empty() {
            return Err(ConfigError::InvalidCommand(self.command.clone()));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    #[serde(flatten)]
    pub server: McpServerConfig,
    pub token_env: String,
    pub toolsets: String,
    pub read_only: bool,
    /// Restricts every call to one repository, `https://github.com/<owner>/<repo>`
    pub repo_url: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            server: McpServerConfig {
                args: vec![
                    "-y".to_string(),
                    "@modelcontextprotocol/server-github".to_string(),
                ],
                ..McpServerConfig::default()
            },
            token_env: "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
            toolsets: "repos,issues,pull_requests,actions,code_security".to_string(),
            read_only: false,
            repo_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JiraConfig {
    #[serde(flatten)]
    pub server: McpServerConfig,
    pub url: Option<String>,
    pub username: Option<String>,
    pub api_token_env: String,
    pub verify_ssl: bool,
    /// Docker image to run instead of `command` when docker is installed
    pub docker_image: Option<String>,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            server: McpServerConfig {
                args: vec![
                    "-y".to_string(),
                    "@modelcontextprotocol/server-atlassian".to_string(),
                ],
                ..McpServerConfig::default()
            },
            url: None,
            username: None,
            api_token_env: "JIRA_API_TOKEN".to_string(),
            verify_ssl: true,
            docker_image: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    InvalidChunkOverlap(usize, usize),
    #[error("Invalid context chunk count: {0} (must be between 1 and 50)")]
    InvalidContextChunks(usize),
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),
    #[error("Invalid MCP server command: {0:?}")]
    InvalidCommand(String),
    #[error("Invalid GitHub repository URL: {0}")]
    InvalidRepoUrl(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Resolve the base directory: `DOBB_HOME`, else `~/.dobb-backend`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Ok(dir) = std::env::var("DOBB_HOME") {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(".dobb-backend"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_env_overrides();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Values most often changed per deployment can come from the environment.
    #[inline]
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_value("DOBB_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(repo_url) = env_value("GITHUB_REPO_URL") {
            self.github.repo_url = Some(repo_url);
        }
        if let Some(read_only) = env_value("GITHUB_MCP_READ_ONLY") {
            self.github.read_only = read_only.eq_ignore_ascii_case("true");
        }
        if let Some(toolsets) = env_value("GITHUB_MCP_TOOLSETS") {
            self.github.toolsets = toolsets;
        }
        if let Some(url) = env_value("JIRA_URL") {
            self.jira.url = Some(url);
        }
        if let Some(username) = env_value("JIRA_USERNAME").or_else(|| env_value("JIRA_USER_NAME"))
        {
            self.jira.username = Some(username);
        }
        if let Some(verify) = env_value("JIRA_VERIFY_SSL") {
            self.jira.verify_ssl = verify.eq_ignore_ascii_case("true");
        }
        if let Some(image) = env_value("JIRA_MCP_SERVER_URL") {
            self.jira.docker_image = Some(image);
        }
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }
        self.llm.validate()?;
        self.embeddings.validate()?;
        self.chunking.validate()?;

        if self.store.collection.trim().is_empty()
            || !self
                .store
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidCollection(self.store.collection.clone()));
        }

        for count in [self.chat.context_chunks, self.report.context_chunks] {
            if !(1..=50).contains(&count) {
                return Err(ConfigError::InvalidContextChunks(count));
            }
        }

        if let Some(prefix) = &self.report.allowed_url_prefix {
            Url::parse(prefix).map_err(|_| ConfigError::InvalidUrl(prefix.clone()))?;
        }

        self.github.server.validate()?;
        if let Some(repo_url) = &self.github.repo_url {
            crate::mcp::github::RepoRef::parse_url(repo_url)
                .ok_or_else(|| ConfigError::InvalidRepoUrl(repo_url.clone()))?;
        }

        self.jira.server.validate()?;
        if let Some(url) = &self.jira.url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("vectors"))
    }
}

/// Read a secret or override from the environment, treating blanks as unset.
#[inline]
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
