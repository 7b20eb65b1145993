use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dobb_backend::commands::{ingest_files, init_config, query_store};
use dobb_backend::config::{Config, get_config_dir, show_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dobb-backend")]
#[command(about = "Document embeddings, chat, PRD reports and GitHub/Jira tools over HTTP")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector store (defaults to $DOBB_HOME or ~/.dobb-backend)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Embed local .txt, .md or .pdf files into the vector store
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search the vector store
    Query {
        /// Query text
        text: String,
        /// Number of chunks to return
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },
    /// Create or show the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Could not determine the configuration directory")?,
    };

    match cli.command {
        Commands::Serve { port } => {
            let mut config = Config::load(&config_dir)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            dobb_backend::api::serve(&config).await?;
        }
        Commands::Ingest { files } => {
            let config = Config::load(&config_dir)?;
            ingest_files(&config, &files).await?;
        }
        Commands::Query { text, k } => {
            let config = Config::load(&config_dir)?;
            query_store(&config, &text, k).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                init_config(&config_dir)?;
            }
        }
    }

    Ok(())
}
