// LLM module
// Completion clients for OpenAI-compatible and Gemini APIs

pub mod gemini;
pub mod openai;
pub mod text;


use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{LlmConfig, LlmProvider};
use crate::{DobbError, Result};

pub use gemini::GeminiClient;
pub use openai::OpenAiChatClient;
pub use text::{parse_llm_json, strip_markdown};

/// Speaker of a conversation turn supplied by the caller.
///
/// The system prompt is always built server-side, so `system` is not a valid
/// history role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DobbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(DobbError::Validation(format!(
                "Unsupported history role '{}' (expected 'user' or 'assistant')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A fully assembled request: system instructions followed by ordered turns.
/// The last turn is the one the model answers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prompt {
    pub system: String,
    pub turns: Vec<ChatTurn>,
}

impl Prompt {
    /// Single-shot prompt with one user message
    #[inline]
    pub fn single(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            turns: vec![ChatTurn::user(message)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// A chat completion backend.
///
/// Calls are blocking; async callers go through [`complete`].
pub trait CompletionModel: Send + Sync {
    fn complete(&self, prompt: &Prompt) -> Result<CompletionResponse>;

    fn model_id(&self) -> &str;
}

/// Build the configured completion client.
///
/// A missing API key is not an error here; it is reported on the first call so
/// the rest of the service can run without one.
#[inline]
pub fn completion_model_from_config(config: &LlmConfig) -> Result<Arc<dyn CompletionModel>> {
    Ok(match config.provider {
        LlmProvider::OpenAi | LlmProvider::Groq => Arc::new(OpenAiChatClient::new(config)?),
        LlmProvider::Gemini => Arc::new(GeminiClient::new(config)?),
    })
}

/// Run one completion on the blocking pool
#[inline]
pub async fn complete(
    model: Arc<dyn CompletionModel>,
    prompt: Prompt,
) -> Result<CompletionResponse> {
    tokio::task::spawn_blocking(move || model.complete(&prompt))
        .await
        .map_err(|e| DobbError::Other(anyhow::anyhow!("Completion task failed: {}", e)))?
}

/// Read the API key named by `env_name`, failing with a configuration error
pub(crate) fn require_api_key(env_name: &str) -> Result<String> {
    crate::config::env_value(env_name).ok_or_else(|| {
        DobbError::Config(format!(
            "Environment variable {} is not set; the LLM API key is required",
            env_name
        ))
    })
}

/// Shorten an upstream error body for messages and logs
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 500;
    let body = body.trim();
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(LIMIT).collect();
        format!("{}...", cut)
    }
}
