//! Language-model provider abstraction.
//!
//! One trait covers both uses the pipeline has for a model: plain chat
//! completion (transaction parsing) and completion over a page image
//! (vision OCR). Implementations: Groq and a scriptable mock.

pub mod groq;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

pub use groq::{GroqProvider, GroqSettings};
pub use mock::MockProvider;

/// Error type for provider operations.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,
}

/// Chat-completion provider. Calls are single-attempt; retries and
/// fallbacks are the caller's decision.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Plain text completion.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ProviderError>;

    /// Completion over one base64-encoded PNG page image.
    async fn complete_with_image(
        &self,
        system_prompt: &str,
        image_png_base64: &str,
    ) -> Result<String, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
