//! Uniform contract over the two text-extraction backends.

use crate::models::ExtractionState;
use crate::services::llm::ProviderError;
use crate::workers::executor::CommandError;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionBackend {
    Layout,
    Vision,
}

impl ExtractionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Vision => "vision",
        }
    }
}

/// What a backend produces before the adapter derives word counts.
#[derive(Debug, Clone)]
pub struct RawExtraction {
    pub text: String,
    pub page_count: i32,
    /// 0-100, reported by the vision backend only.
    pub confidence: Option<i32>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CommandError> for ExtractError {
    fn from(err: CommandError) -> Self {
        ExtractError::BackendUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn backend(&self) -> ExtractionBackend;

    async fn extract(&self, file_path: &Path) -> Result<RawExtraction, ExtractError>;
}

/// Run one backend in isolation: any failure becomes a failed
/// `ExtractionState`, never an error the caller has to handle. Word count
/// is the whitespace-delimited token count of the returned text.
pub async fn attempt(extractor: &dyn TextExtractor, file_path: &Path) -> ExtractionState {
    match extractor.extract(file_path).await {
        Ok(raw) => ExtractionState {
            success: true,
            word_count: raw.text.split_whitespace().count() as i32,
            page_count: raw.page_count,
            text: Some(raw.text),
            error: None,
            confidence: raw.confidence,
        },
        Err(e) => {
            tracing::warn!(
                backend = extractor.backend().as_str(),
                error = %e,
                "Extraction backend failed"
            );
            ExtractionState::failed(e.to_string())
        }
    }
}
