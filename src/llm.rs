//! Chat-completion client.
//!
//! Sends a single user message to an OpenAI-compatible
//! `/v1/chat/completions` endpoint (the Hugging Face router by default)
//! and returns the first choice's content.
//!
//! # Error policy
//!
//! Every failure is an error; there is no sentinel text and no retry.
//!
//! | Condition | Error |
//! |-----------|-------|
//! | API key env var unset | [`ServiceError::Config`], before any network call |
//! | transport failure | [`ServiceError::Upstream`] |
//! | non-2xx status | [`ServiceError::Upstream`] with status and body |
//! | 2xx with `{"error": ...}` | [`ServiceError::Upstream`] |
//! | 2xx without `choices[0].message.content` | [`ServiceError::Upstream`] ("unexpected response format") |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{ServiceError, ServiceResult};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> ServiceResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// HTTP implementation of [`LlmClient`].
pub struct HttpLlmClient {
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: Option<String>,
    api_key_env: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    /// Build a client from config, reading the API key from the
    /// environment variable named by `llm.api_key_env`.
    ///
    /// A missing key is not an error here; it is reported by
    /// [`generate`](LlmClient::generate) so that the rest of the service
    /// can start without LLM credentials.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key,
            api_key_env: config.api_key_env.clone(),
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    #[tracing::instrument(name = "chat completion", skip(self, prompt), fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> ServiceResult<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ServiceError::Config(format!(
                "{} environment variable is not set",
                self.api_key_env
            ))
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("LLM request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Upstream(format!("LLM response unreadable: {}", e)))?;

        if !status.is_success() {
            tracing::error!(%status, body = %text, "LLM API returned an error status");
            return Err(ServiceError::Upstream(format!(
                "LLM API error {}: {}",
                status, text
            )));
        }

        parse_chat_response(&text)
    }
}

/// Extract the generated text from a 2xx response body.
fn parse_chat_response(body: &str) -> ServiceResult<String> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        ServiceError::Upstream(format!("unexpected response format from LLM API: {}", e))
    })?;

    if let Some(err) = parsed.error {
        return Err(ServiceError::Upstream(format!("LLM API error: {}", err)));
    }

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| {
            ServiceError::Upstream("unexpected response format from LLM API".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"You shine."}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "You shine.");
    }

    #[test]
    fn test_parse_error_field() {
        let body = r#"{"error":"model overloaded"}"#;
        let err = parse_chat_response(body).unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(ref m) if m.contains("model overloaded")));
    }

    #[test]
    fn test_parse_empty_choices_is_error() {
        let err = parse_chat_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("unexpected response format"));
    }

    #[test]
    fn test_parse_missing_content_is_error() {
        let err = parse_chat_response(r#"{"choices":[{"message":{"role":"assistant"}}]}"#)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(parse_chat_response("<html>").is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let config = LlmConfig {
            // Unroutable; a network attempt would surface as Upstream, not Config.
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            ..LlmConfig::default()
        };
        let client = HttpLlmClient::new(&config, None).unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::Config(ref m) if m.contains("HF_API_TOKEN")));
    }

    #[test]
    fn test_request_shape() {
        let req = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "p",
            }],
            max_tokens: 2000,
            temperature: 0.7,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 2000);
    }
}
