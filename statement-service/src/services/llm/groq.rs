//! Groq provider implementation.
//!
//! Talks to Groq's OpenAI-compatible chat completions API. Text parsing and
//! vision OCR use separate models from the same endpoint.

use super::{CompletionProvider, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Groq API base URL.
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Groq provider configuration.
#[derive(Debug, Clone)]
pub struct GroqSettings {
    pub api_key: String,
    pub text_model: String,
    pub vision_model: String,
    pub request_timeout_secs: u64,
}

pub struct GroqProvider {
    settings: GroqSettings,
    client: Client,
}

impl GroqProvider {
    pub fn new(settings: GroqSettings) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { settings, client }
    }

    async fn send(&self, request: ChatCompletionRequest<'_>) -> Result<String, ProviderError> {
        if self.settings.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Groq API key not configured".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", GROQ_API_BASE);

        tracing::debug!(model = %request.model, "Sending request to Groq API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Groq API error {}: {}",
                status, error_text
            )));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError("Response contained no choices".to_string()))?;

        if let Some(usage) = &api_response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
                "Groq completion finished"
            );
        }

        choice
            .message
            .content
            .ok_or_else(|| ProviderError::ApiError("Response contained no content".to_string()))
    }
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.settings.text_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system_prompt.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Text(user_prompt.to_string()),
                },
            ],
            temperature: 0.1,
            max_completion_tokens: Some(4096),
            top_p: None,
        };

        self.send(request).await
    }

    async fn complete_with_image(
        &self,
        system_prompt: &str,
        image_png_base64: &str,
    ) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.settings.vision_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system_prompt.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/png;base64,{}", image_png_base64),
                            },
                        },
                        ContentPart::Text {
                            text: "Please extract all text from this image.".to_string(),
                        },
                    ]),
                },
            ],
            temperature: 0.6,
            max_completion_tokens: Some(8192),
            top_p: Some(0.95),
        };

        self.send(request).await
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.settings.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Groq API key not configured".to_string(),
            ));
        }

        let url = format!("{}/models", GROQ_API_BASE);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

// ============================================================================
// Groq API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<i32>,
    #[serde(default)]
    completion_tokens: Option<i32>,
}
