use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sage_models::config::LlmConfig;

use crate::error::PipelineError;

/// Environment variable consulted when the config carries no API key.
pub const API_KEY_ENV: &str = "SAGE_API_KEY";

/// One completed LLM exchange: the raw reply text plus the provider's
/// token accounting. Counters are zero when the provider omits usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmReply {
    pub raw_text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Seam between the pipeline and whichever LLM backs it. The scripted
/// implementation in `test_support` stands in for the HTTP client in
/// tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        system_message: &str,
        user_message: &str,
        model_id: &str,
    ) -> Result<LlmReply, PipelineError>;
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, PipelineError> {
        let api_key = if config.api_key.is_empty() {
            std::env::var(API_KEY_ENV).map_err(|_| {
                PipelineError::LlmUnavailable(format!(
                    "no API key in config and {API_KEY_ENV} is not set"
                ))
            })?
        } else {
            config.api_key.clone()
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::LlmUnavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn invoke(
        &self,
        system_message: &str,
        user_message: &str,
        model_id: &str,
    ) -> Result<LlmReply, PipelineError> {
        let body = ChatRequest {
            model: model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_message,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = model_id, url = %url, "sending chat completion request");
        let started = Instant::now();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::LlmUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::LlmUnavailable(format!(
                "API returned {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::LlmUnavailable(format!("malformed response: {e}")))?;

        let usage = parsed.usage.unwrap_or_default();
        let raw_text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if raw_text.trim().is_empty() {
            return Err(PipelineError::LlmEmptyResponse);
        }

        info!(
            model = model_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat completion finished"
        );

        Ok(LlmReply {
            raw_text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            temperature: 0.0,
            max_tokens: 1000,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "usr");
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn response_parses_with_and_without_usage() {
        let with: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"All good. 7.5"}}],
                "usage":{"prompt_tokens":321,"completion_tokens":45}}"#,
        )
        .unwrap();
        assert_eq!(
            with.choices[0].message.content.as_deref(),
            Some("All good. 7.5")
        );
        assert_eq!(with.usage.unwrap().prompt_tokens, 321);

        let without: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"text"}}]}"#).unwrap();
        assert!(without.usage.is_none());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let config = LlmConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            api_key: "k".to_string(),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }
}
