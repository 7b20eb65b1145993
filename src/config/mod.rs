// Configuration management module
// TOML settings in the base directory, secrets from the environment

pub mod settings;


use anyhow::{Context, Result};
use console::style;
use std::path::Path;

pub use settings::{
    ChatConfig, Config, ConfigError, EmbeddingProvider, EmbeddingsConfig, GithubConfig,
    JiraConfig, LlmConfig, LlmProvider, McpServerConfig, ReportConfig, ServerConfig, StoreConfig,
    env_value,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}

/// Print the effective configuration, secrets reduced to set/unset
#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!(
        "  Listen: {}",
        style(format!("{}:{}", config.server.host, config.server.port)).cyan()
    );

    eprintln!("{}", style("LLM:").bold().yellow());
    eprintln!("  Provider: {}", style(format!("{:?}", config.llm.provider)).cyan());
    eprintln!("  Model: {}", style(&config.llm.model).cyan());
    eprintln!("  Endpoint: {}", style(config.llm.base_url()).cyan());
    eprintln!(
        "  API key ({}): {}",
        config.llm.api_key_env(),
        secret_status(config.llm.api_key_env())
    );

    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!(
        "  Provider: {}",
        style(format!("{:?}", config.embeddings.provider)).cyan()
    );
    eprintln!("  Endpoint: {}", style(&config.embeddings.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embeddings.model).cyan());
    eprintln!("  Dimension: {}", style(config.embeddings.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embeddings.batch_size).cyan());
    if config.embeddings.provider == EmbeddingProvider::Ollama {
        let status = crate::embeddings::OllamaClient::new(&config.embeddings)
            .and_then(|client| client.health_check());
        match status {
            Ok(()) => eprintln!("  Status: {}", style("reachable").green()),
            Err(e) => eprintln!("  Status: {} ({:#})", style("unavailable").red(), e),
        }
    }
    eprintln!(
        "  Chunking: {} chars, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!(
        "  Path: {}",
        style(config.vector_database_path().display()).cyan()
    );
    eprintln!("  Collection: {}", style(&config.store.collection).cyan());

    eprintln!("{}", style("GitHub MCP:").bold().yellow());
    eprintln!("  Server: {}", style(describe_server(&config.github.server)).cyan());
    eprintln!(
        "  Token ({}): {}",
        config.github.token_env,
        secret_status(&config.github.token_env)
    );
    if let Some(repo) = &config.github.repo_url {
        eprintln!("  Enforced repository: {}", style(repo).cyan());
    }

    eprintln!("{}", style("Jira MCP:").bold().yellow());
    eprintln!("  Server: {}", style(describe_server(&config.jira.server)).cyan());
    eprintln!(
        "  URL: {}",
        style(config.jira.url.as_deref().unwrap_or("(unset)")).cyan()
    );
    eprintln!(
        "  Token ({}): {}",
        config.jira.api_token_env,
        secret_status(&config.jira.api_token_env)
    );

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn describe_server(server: &McpServerConfig) -> String {
    server.http_url.clone().unwrap_or_else(|| {
        let mut parts = vec![server.command.clone()];
        parts.extend(server.args.iter().cloned());
        parts.join(" ")
    })
}

fn secret_status(env_name: &str) -> console::StyledObject<&'static str> {
    if env_value(env_name).is_some() {
        style("set").green()
    } else {
        style("not set").red()
    }
}
