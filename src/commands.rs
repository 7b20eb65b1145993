use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::documents::Document;
use crate::rag::EmbeddingPipeline;

/// Ingest local files into the vector store
///
/// Files that fail are reported and skipped; the command fails only when
/// nothing could be ingested.
#[inline]
pub async fn ingest_files(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let pipeline = EmbeddingPipeline::from_config(config)
        .await
        .context("Failed to open embedding pipeline")?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(paths.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    let mut ingested = 0;
    let mut total_chunks = 0;
    for path in paths {
        bar.set_message(path.display().to_string());
        match ingest_file(&pipeline, path).await {
            Ok(chunks) => {
                ingested += 1;
                total_chunks += chunks;
                bar.println(format!(
                    "{} {} ({} chunks)",
                    style("✓").green(),
                    path.display(),
                    chunks
                ));
            }
            Err(e) => {
                warn!("Failed to ingest {}: {:#}", path.display(), e);
                bar.println(format!("{} {}: {:#}", style("✗").red(), path.display(), e));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    eprintln!(
        "Ingested {} of {} files ({} chunks) into '{}'",
        style(ingested).cyan(),
        paths.len(),
        style(total_chunks).cyan(),
        style(pipeline.store().collection()).cyan()
    );

    if ingested == 0 && !paths.is_empty() {
        anyhow::bail!("No files were ingested");
    }
    Ok(())
}

async fn ingest_file(pipeline: &EmbeddingPipeline, path: &Path) -> Result<usize> {
    let owned = path.to_path_buf();
    let document = tokio::task::spawn_blocking(move || Document::from_path(&owned))
        .await
        .context("Document reader panicked")??;
    let report = pipeline.ingest(&document).await?;
    Ok(report.chunks_stored)
}

/// Print the chunks closest to `text`
#[inline]
pub async fn query_store(config: &Config, text: &str, k: usize) -> Result<()> {
    let pipeline = EmbeddingPipeline::from_config(config)
        .await
        .context("Failed to open embedding pipeline")?;
    let results = pipeline.query(text, k).await?;

    if results.is_empty() {
        println!("{}", style("No matching chunks").yellow());
        return Ok(());
    }

    for (rank, chunk) in results.iter().enumerate() {
        println!(
            "{} {} {}",
            style(format!("#{}", rank + 1)).bold(),
            style(format!("{}:{}", chunk.source, chunk.chunk_index)).cyan(),
            style(format!("(score {:.3})", chunk.score)).dim()
        );
        println!("{}", chunk.text.trim());
        println!();
    }
    Ok(())
}

/// Write a config file with default settings unless one exists
#[inline]
pub fn init_config(config_dir: &Path) -> Result<()> {
    let path = config_dir.join("config.toml");
    if path.exists() {
        eprintln!(
            "Config file already exists: {}",
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let config = Config::load(config_dir)?;
    config.save()?;
    info!("Wrote default configuration to {}", path.display());
    eprintln!("Created config file: {}", style(path.display()).cyan());
    eprintln!(
        "Set secrets such as {} in the environment or a .env file",
        style(config.llm.api_key_env()).bold()
    );
    Ok(())
}
