//! Language-model port and OpenAI-compatible client
//!
//! The service sends role-tagged chat messages (optionally with an inline
//! image) and receives a single text completion that is expected to contain
//! a JSON object. Callers own the fallback policy: every error returned here
//! is absorbed by the enrichment and bid-evaluation gateways.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use infrafix_common::config::LanguageModelConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "InfraFix/0.1.0";

/// Language-model client errors
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// No API key configured
    #[error("Language model not configured")]
    NotConfigured,

    /// Network communication error (includes client timeout)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Service returned a non-success status
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Response body was not the expected shape
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Response contained no completion text
    #[error("Empty completion")]
    EmptyCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// One entry of a multi-part message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Concatenated text of the message, images omitted
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(&self.content, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

/// Inline image as a `data:` URL
pub fn image_data_url(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}

/// Chat completion port
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the completion text for `messages`
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LanguageModelError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client
pub struct OpenAiChatClient {
    http_client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(config: &LanguageModelConfig) -> Result<Self, LanguageModelError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LanguageModelError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LanguageModelError> {
        let api_key = self.api_key.as_deref().ok_or(LanguageModelError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.api_base);

        tracing::debug!(url = %url, model = %self.model, messages = messages.len(), "Requesting chat completion");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
                max_tokens,
            })
            .send()
            .await
            .map_err(|e| LanguageModelError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::ApiError(status.as_u16(), error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LanguageModelError::ParseError(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LanguageModelError::EmptyCompletion)
    }
}

/// Strip an optional Markdown code fence around a JSON completion
pub fn extract_json_payload(completion: &str) -> &str {
    let trimmed = completion.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAiChatClient::new(&LanguageModelConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_error() {
        let client = OpenAiChatClient::new(&LanguageModelConfig::default()).unwrap();
        let result = client.complete(&[ChatMessage::user("hi")], 10).await;
        assert!(matches!(result, Err(LanguageModelError::NotConfigured)));
    }

    #[test]
    fn test_message_wire_format() {
        let messages = vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user_parts(vec![
                ContentPart::Text {
                    text: "Look".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/jpeg;base64,AAAA".to_string(),
                    },
                },
            ]),
        ];

        let json = serde_json::to_value(&messages).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "You are terse.");
        assert_eq!(json[1]["content"][0]["type"], "text");
        assert_eq!(json[1]["content"][1]["type"], "image_url");
        assert_eq!(json[1]["content"][1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_image_data_url() {
        assert_eq!(image_data_url(b"abc"), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_extract_json_payload() {
        assert_eq!(extract_json_payload(" {\"a\":1} "), "{\"a\":1}");
        assert_eq!(extract_json_payload("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json_payload("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(extract_json_payload("no json here"), "no json here");
    }

    #[test]
    fn test_message_text_skips_images() {
        let msg = ChatMessage::user_parts(vec![
            ContentPart::Text {
                text: "Title: x".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:".to_string(),
                },
            },
        ]);
        assert_eq!(msg.text(), "Title: x");
        assert!(msg.has_image());
        assert!(!ChatMessage::user("plain").has_image());
    }
}
