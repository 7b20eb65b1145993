#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    CompletionModel, CompletionResponse, Prompt, TokenUsage, require_api_key, truncate_body,
};
use crate::config::LlmConfig;
use crate::{DobbError, Result};

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenAI, Groq)
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    endpoint: String,
    api_key_env: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| DobbError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
            api_key_env: config.api_key_env().to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            agent,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> Result<String> {
        let mut messages = Vec::with_capacity(prompt.turns.len() + 1);
        if !prompt.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &prompt.system,
            });
        }
        messages.extend(prompt.turns.iter().map(|turn| ChatMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        serde_json::to_string(&ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
        .map_err(|e| DobbError::Other(anyhow::anyhow!("Failed to serialize chat request: {}", e)))
    }
}

impl CompletionModel for OpenAiChatClient {
    fn complete(&self, prompt: &Prompt) -> Result<CompletionResponse> {
        let api_key = require_api_key(&self.api_key_env)?;
        let body = self.request_body(prompt)?;

        debug!(
            "Requesting completion from {} ({} turns)",
            self.endpoint,
            prompt.turns.len()
        );

        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", api_key))
            .send(&body)
            .map_err(|e| {
                DobbError::Upstream(format!(
                    "Completion request to {} failed: {}",
                    self.endpoint, e
                ))
            })?;

        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| {
                DobbError::Upstream(format!("Failed to read completion response: {}", e))
            })?;

        if !status.is_success() {
            warn!("Completion API answered {}", status);
            return Err(DobbError::Upstream(format!(
                "Completion API returned {}: {}",
                status,
                truncate_body(&text)
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            DobbError::Upstream(format!("Failed to parse completion response: {}", e))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DobbError::Upstream("Completion response had no choices".to_string()))?;

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: choice.finish_reason,
            usage: parsed.usage,
        })
    }

    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }
}
