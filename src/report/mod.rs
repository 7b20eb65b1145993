//! PRD analysis: a report of five LLM sections generated concurrently and
//! merged, and user stories with test cases.

mod fetch;
mod prompts;
mod stories;


use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReportConfig;
use crate::llm::{self, CompletionModel, Prompt, parse_llm_json};
use crate::rag::EmbeddingPipeline;
use crate::{DobbError, Result};

pub use fetch::PrdFetcher;
pub use stories::UserStoryService;

/// Upper bound on PRD characters used as the similarity query
const CONTEXT_QUERY_CHARS: usize = 2000;

/// Where to read a PRD from. Inline text wins over the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub prd_text: Option<String>,
    #[serde(default)]
    pub prd_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Summary,
    RefinedPrd,
    ImpactedModules,
    TechnicalImpacts,
    IdentifiedGaps,
}

impl Section {
    pub const ALL: [Self; 5] = [
        Self::Summary,
        Self::RefinedPrd,
        Self::ImpactedModules,
        Self::TechnicalImpacts,
        Self::IdentifiedGaps,
    ];

    #[inline]
    pub fn key(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::RefinedPrd => "refined_prd",
            Self::ImpactedModules => "impacted_modules",
            Self::TechnicalImpacts => "technical_impacts",
            Self::IdentifiedGaps => "identified_gaps",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            Self::Summary => prompts::SUMMARY,
            Self::RefinedPrd => prompts::REFINED_PRD,
            Self::ImpactedModules => prompts::IMPACTED_MODULES,
            Self::TechnicalImpacts => prompts::TECHNICAL_IMPACTS,
            Self::IdentifiedGaps => prompts::IDENTIFIED_GAPS,
        }
    }

    /// Sections that compare the PRD against the knowledge base
    fn uses_context(self) -> bool {
        matches!(
            self,
            Self::ImpactedModules | Self::TechnicalImpacts | Self::IdentifiedGaps
        )
    }

    fn returns_json(self) -> bool {
        !matches!(self, Self::RefinedPrd)
    }
}

pub struct ReportService {
    pipeline: Arc<EmbeddingPipeline>,
    model: Arc<dyn CompletionModel>,
    fetcher: PrdFetcher,
    context_chunks: usize,
}

impl ReportService {
    #[inline]
    pub fn new(
        pipeline: Arc<EmbeddingPipeline>,
        model: Arc<dyn CompletionModel>,
        fetcher: PrdFetcher,
        context_chunks: usize,
    ) -> Self {
        Self {
            pipeline,
            model,
            fetcher,
            context_chunks: context_chunks.max(1),
        }
    }

    #[inline]
    pub fn from_config(
        config: &ReportConfig,
        pipeline: Arc<EmbeddingPipeline>,
        model: Arc<dyn CompletionModel>,
    ) -> Self {
        let fetcher = PrdFetcher::new(
            config.allowed_url_prefix.clone(),
            config.fetch_timeout_seconds,
        );
        Self::new(pipeline, model, fetcher, config.context_chunks)
    }

    /// Generate the full report.
    ///
    /// Only request-level problems (no PRD, bad URL, failed download) fail the
    /// call; a failing section is reported in place as `{"error": ...}`.
    #[inline]
    pub async fn generate(&self, request: ReportRequest) -> Result<Value> {
        let prd = self.fetcher.resolve(request).await?;
        info!("Generating report for a {} character PRD", prd.chars().count());

        let context = knowledge_context(&self.pipeline, &prd, self.context_chunks).await;
        if let Err(message) = &context {
            warn!("Context retrieval failed, context sections will report it: {}", message);
        }

        let (summary, refined, impacted, technical, gaps) = tokio::join!(
            self.run_section(Section::Summary, &prd, &context),
            self.run_section(Section::RefinedPrd, &prd, &context),
            self.run_section(Section::ImpactedModules, &prd, &context),
            self.run_section(Section::TechnicalImpacts, &prd, &context),
            self.run_section(Section::IdentifiedGaps, &prd, &context),
        );

        Ok(merge_sections([
            (Section::Summary, summary),
            (Section::RefinedPrd, refined),
            (Section::ImpactedModules, impacted),
            (Section::TechnicalImpacts, technical),
            (Section::IdentifiedGaps, gaps),
        ]))
    }

    async fn run_section(
        &self,
        section: Section,
        prd: &str,
        context: &std::result::Result<String, String>,
    ) -> Result<Value> {
        let system = if section.uses_context() {
            let context = context.as_ref().map_err(|message| DobbError::EmbeddingService {
                message: message.clone(),
                chunks_stored: 0,
            })?;
            format!(
                "{}\n\nContext from the knowledge base:\n{}",
                section.system_prompt(),
                context
            )
        } else {
            section.system_prompt().to_string()
        };

        let prompt = Prompt::single(system, format!("PRD:\n{}", prd));
        let response = llm::complete(Arc::clone(&self.model), prompt).await?;
        debug!("Section {} produced {} chars", section.key(), response.text.len());

        if section.returns_json() {
            parse_llm_json(&response.text).ok_or_else(|| {
                DobbError::Upstream(format!(
                    "Model output for {} was not valid JSON",
                    section.key()
                ))
            })
        } else {
            Ok(Value::String(response.text))
        }
    }
}

/// Knowledge base passages related to the start of the PRD, formatted for a
/// system prompt
async fn knowledge_context(
    pipeline: &EmbeddingPipeline,
    prd: &str,
    limit: usize,
) -> std::result::Result<String, String> {
    let query: String = prd.chars().take(CONTEXT_QUERY_CHARS).collect();
    let chunks = pipeline
        .query(&query, limit)
        .await
        .map_err(|e| e.to_string())?;
    debug!("Retrieved {} context passages for the PRD", chunks.len());

    if chunks.is_empty() {
        return Ok("(the knowledge base has no related passages)".to_string());
    }
    Ok(chunks
        .iter()
        .map(|chunk| format!("[{}]\n{}", chunk.source, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Flatten section results into one object.
///
/// JSON objects are spread into the top level, `refined_prd` stays a string,
/// anything else (arrays, failures) is stored under the section's own key.
fn merge_sections(results: [(Section, Result<Value>); 5]) -> Value {
    let mut report = Map::new();
    for (section, result) in results {
        match result {
            Ok(Value::Object(fields)) if section.returns_json() => report.extend(fields),
            Ok(value) => {
                report.insert(section.key().to_string(), value);
            }
            Err(e) => {
                warn!("Report section {} failed: {}", section.key(), e);
                report.insert(section.key().to_string(), json!({ "error": e.to_string() }));
            }
        }
    }
    Value::Object(report)
}
