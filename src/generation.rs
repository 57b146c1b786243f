//! Generation backend abstraction and the OpenAI chat-completions
//! implementation.
//!
//! Mirrors the embedding client's transport behavior: rustls HTTP with a
//! request timeout, retry with exponential backoff on 429/5xx/network
//! errors, immediate failure on other client errors. An empty completion
//! is treated as unusable output and surfaced as a generation error.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::embedding::API_KEY_VAR;
use crate::error::{PipelineError, Result};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// One generation call: an optional system prompt, the user prompt, and
/// the per-path model/token settings chosen by the synthesizer.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
}

/// Trait for generation backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce a completion for the request. Returns the raw model output;
    /// parsing and cleanup happen in the answer synthesizer.
    async fn complete(&self, request: GenerationRequest) -> Result<String>;
}

/// Generation backend using the OpenAI chat completions API.
pub struct OpenAiGeneration {
    client: reqwest::Client,
    api_key: String,
    max_retries: u32,
}

impl OpenAiGeneration {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| {
            PipelineError::Configuration(format!(
                "{} environment variable not set",
                API_KEY_VAR
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiGeneration {
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(CHAT_COMPLETIONS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::Generation(format!("invalid completion response: {}", e))
                        })?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::Generation(format!(
                            "completions API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::Generation(format!(
                        "completions API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::Generation(format!(
                        "completion request failed: {}",
                        e
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::Generation("generation failed after retries".to_string())
        }))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            PipelineError::Generation("completion response has no message content".to_string())
        })?;

    if content.trim().is_empty() {
        return Err(PipelineError::Generation(
            "completion response is empty".to_string(),
        ));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_first_choice_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "An answer." } }
            ]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "An answer.");
    }

    #[test]
    fn parse_rejects_missing_choices() {
        let json = serde_json::json!({ "usage": { "total_tokens": 3 } });
        assert!(parse_completion_response(&json).is_err());
    }

    #[test]
    fn parse_rejects_blank_content() {
        let json = serde_json::json!({
            "choices": [ { "message": { "content": "   " } } ]
        });
        assert!(matches!(
            parse_completion_response(&json),
            Err(PipelineError::Generation(_))
        ));
    }
}
