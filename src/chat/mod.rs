//! Retrieval-augmented chat over the ingested knowledge base.


use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::llm::{self, ChatTurn, CompletionModel, Prompt, Role, strip_markdown};
use crate::rag::{EmbeddingPipeline, RetrievedChunk};
use crate::{DobbError, Result};

const PREVIEW_CHARS: usize = 150;

const DEFAULT_REFERENCE_TEXT: &str = "\
You are the onboarding assistant for TechStore, an online shop for gadgets and other \
technical products. New team members ask you about the product: its features, how it \
behaves for shoppers, and why it matters to the business.

TechStore at a glance:
- A product catalog with images, prices, stock levels and full descriptions
- A cart supporting adding and removing items, changing quantities, live totals and checkout
- Customer accounts with registration, sign-in, profile editing and order history
- A responsive layout that works on phones and desktops alike
- Order data that each customer can only see for themselves
- Everything above shipped through the third development phase";

const ANSWER_RULES: &str = "\
How to answer:
1. Use only the retrieved context above as your source of facts.
2. When the context does not cover the question, reply: \"I don't have enough information \
in my knowledge base to answer that specific question about TechStore.\"
3. Explain features, workflows and their value to customers in plain language.
4. Go into deep technical detail only when the question asks for it.
5. When asked to file a Jira ticket, check the context for an existing ticket and say \
whether it already exists.";

const NO_CONTEXT: &str = "(no matching passages in the knowledge base)";

/// One prior turn as sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    /// Strip markdown from the reply
    #[serde(default)]
    pub plain_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// 1-based rank of the passage in the retrieved context
    pub chunk_id: usize,
    pub source: String,
    pub content_preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub sources: Vec<SourceInfo>,
}

pub struct ChatService {
    pipeline: Arc<EmbeddingPipeline>,
    model: Arc<dyn CompletionModel>,
    reference_text: String,
    context_chunks: usize,
}

impl ChatService {
    #[inline]
    pub fn new(
        pipeline: Arc<EmbeddingPipeline>,
        model: Arc<dyn CompletionModel>,
        reference_text: impl Into<String>,
        context_chunks: usize,
    ) -> Self {
        Self {
            pipeline,
            model,
            reference_text: reference_text.into(),
            context_chunks: context_chunks.max(1),
        }
    }

    /// Build from configuration, reading the reference text file when one is set
    #[inline]
    pub fn from_config(
        config: &ChatConfig,
        pipeline: Arc<EmbeddingPipeline>,
        model: Arc<dyn CompletionModel>,
    ) -> Result<Self> {
        let reference_text = match &config.reference_text_path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                DobbError::Config(format!(
                    "Failed to read chat reference text {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => DEFAULT_REFERENCE_TEXT.to_string(),
        };
        Ok(Self::new(
            pipeline,
            model,
            reference_text,
            config.context_chunks,
        ))
    }

    /// Answer one message, grounded in the closest stored passages
    #[inline]
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(DobbError::Validation("Message is empty".to_string()));
        }
        let history = parse_history(&request.history)?;

        info!(
            "Chat request ({} chars, {} history turns)",
            message.chars().count(),
            history.len()
        );

        let context = self.pipeline.query(message, self.context_chunks).await?;
        debug!("Retrieved {} context passages", context.len());

        let prompt = self.build_prompt(&context, &history, message);
        let response = llm::complete(Arc::clone(&self.model), prompt).await?;

        let reply = if request.plain_text {
            strip_markdown(&response.text)
        } else {
            response.text
        };

        Ok(ChatReply {
            reply,
            sources: sources_for(&context),
        })
    }

    /// System text, then the caller's history verbatim, then the new message
    #[inline]
    pub fn build_prompt(
        &self,
        context: &[RetrievedChunk],
        history: &[ChatTurn],
        message: &str,
    ) -> Prompt {
        let context_text = if context.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            context
                .iter()
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let system = format!(
            "{}\n\nRETRIEVED CONTEXT:\n{}\n\n{}",
            self.reference_text.trim(),
            context_text,
            ANSWER_RULES
        );

        let mut turns = Vec::with_capacity(history.len() + 1);
        turns.extend_from_slice(history);
        turns.push(ChatTurn::user(message));

        Prompt { system, turns }
    }
}

fn parse_history(history: &[HistoryMessage]) -> Result<Vec<ChatTurn>> {
    history
        .iter()
        .map(|message| {
            Ok(ChatTurn {
                role: message.role.parse::<Role>()?,
                content: message.content.clone(),
            })
        })
        .collect()
}

fn sources_for(context: &[RetrievedChunk]) -> Vec<SourceInfo> {
    context
        .iter()
        .enumerate()
        .map(|(i, chunk)| SourceInfo {
            chunk_id: i + 1,
            source: chunk.source.clone(),
            content_preview: preview(&chunk.text),
        })
        .collect()
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
