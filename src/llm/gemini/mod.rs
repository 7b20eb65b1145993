
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    CompletionModel, CompletionResponse, Prompt, Role, TokenUsage, require_api_key,
    truncate_body,
};
use crate::config::LlmConfig;
use crate::{DobbError, Result};

/// Client for the Gemini `generateContent` API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key_env: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl GeminiClient {
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
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env().to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            agent,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(&self, prompt: &Prompt) -> Result<String> {
        // Gemini names the assistant side "model"
        let contents = prompt
            .turns
            .iter()
            .map(|turn| Content {
                role: Some(match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }),
                parts: vec![Part {
                    text: &turn.content,
                }],
            })
            .collect();

        let system_instruction = (!prompt.system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: &prompt.system,
            }],
        });

        serde_json::to_string(&GenerateRequest {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        })
        .map_err(|e| DobbError::Other(anyhow::anyhow!("Failed to serialize Gemini request: {}", e)))
    }
}

impl CompletionModel for GeminiClient {
    fn complete(&self, prompt: &Prompt) -> Result<CompletionResponse> {
        let api_key = require_api_key(&self.api_key_env)?;
        let body = self.request_body(prompt)?;
        let endpoint = self.endpoint();

        debug!("Requesting Gemini completion from {}", endpoint);

        let mut response = self
            .agent
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &api_key)
            .send(&body)
            .map_err(|e| {
                DobbError::Upstream(format!("Gemini request to {} failed: {}", endpoint, e))
            })?;

        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| DobbError::Upstream(format!("Failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            warn!("Gemini API answered {}", status);
            return Err(DobbError::Upstream(format!(
                "Gemini API returned {}: {}",
                status,
                truncate_body(&text)
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| DobbError::Upstream(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            DobbError::Upstream("Gemini response had no candidates".to_string())
        })?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            model: parsed.model_version.unwrap_or_else(|| self.model.clone()),
            finish_reason: candidate.finish_reason,
            usage: parsed.usage_metadata.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            }),
        })
    }

    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }
}
