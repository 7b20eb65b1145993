//! User stories with test cases, drafted from a PRD in one completion.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{PrdFetcher, ReportRequest, knowledge_context, prompts};
use crate::config::ReportConfig;
use crate::llm::{self, CompletionModel, Prompt, parse_llm_json};
use crate::rag::EmbeddingPipeline;
use crate::{DobbError, Result};

/// Keys models wrap the story list in when they ignore the list shape
const WRAPPER_KEYS: [&str; 3] = ["user_stories", "userStories", "stories"];

pub struct UserStoryService {
    pipeline: Arc<EmbeddingPipeline>,
    model: Arc<dyn CompletionModel>,
    fetcher: PrdFetcher,
    context_chunks: usize,
}

impl UserStoryService {
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

    /// Draft user stories for a PRD.
    ///
    /// Unlike the report, there is a single completion, so a failed context
    /// lookup or unparseable model output fails the whole call.
    #[inline]
    pub async fn generate(&self, request: ReportRequest) -> Result<Vec<Value>> {
        let prd = self.fetcher.resolve(request).await?;
        info!("Drafting user stories for a {} character PRD", prd.chars().count());

        let context = knowledge_context(&self.pipeline, &prd, self.context_chunks)
            .await
            .map_err(|message| DobbError::EmbeddingService {
                message,
                chunks_stored: 0,
            })?;
        let system = format!(
            "{}\n\nContext from the knowledge base:\n{}",
            prompts::USER_STORIES,
            context
        );
        let prompt = Prompt::single(system, format!("PRD:\n{}", prd));
        let response = llm::complete(Arc::clone(&self.model), prompt).await?;
        debug!("User story draft is {} chars", response.text.len());

        let parsed = parse_llm_json(&response.text).ok_or_else(|| {
            DobbError::Upstream("Model output for user stories was not valid JSON".to_string())
        })?;
        story_list(parsed)
    }
}

/// Accept a bare list, a list under a wrapper key, or a single story object
fn story_list(value: Value) -> Result<Vec<Value>> {
    let stories = match value {
        Value::Array(items) => items,
        Value::Object(mut fields) => {
            let wrapped = WRAPPER_KEYS
                .iter()
                .find_map(|key| match fields.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                });
            match wrapped {
                Some(items) => items,
                None if fields.contains_key("title") => vec![Value::Object(fields)],
                None => {
                    return Err(DobbError::Upstream(
                        "Model output did not contain a list of user stories".to_string(),
                    ));
                }
            }
        }
        _ => {
            return Err(DobbError::Upstream(
                "Model output did not contain a list of user stories".to_string(),
            ));
        }
    };

    let total = stories.len();
    let stories: Vec<Value> = stories.into_iter().filter(Value::is_object).collect();
    if stories.len() < total {
        warn!("Dropped {} user story entries that were not objects", total - stories.len());
    }
    Ok(stories)
}
