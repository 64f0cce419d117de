//! Vision-based extraction: render each page with poppler's pdftoppm,
//! then OCR the page images through a vision chat model. Slower and
//! billed per call, but works on scanned documents.

use crate::services::llm::CompletionProvider;
use crate::workers::executor::CommandExecutor;
use crate::workers::extractor::{ExtractError, ExtractionBackend, RawExtraction, TextExtractor};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const OCR_SYSTEM_PROMPT: &str = "\
You are an expert OCR (Optical Character Recognition) system. Extract all \
text from the provided image with high accuracy.

Instructions:
1. Read all text visible in the image
2. Maintain the original formatting and layout as much as possible
3. Include headers, footers, and any text in margins
4. Preserve numbers, dates, and special characters
5. If text is unclear or partially visible, indicate with [unclear] or [partial]
6. Return the extracted text in a clean, readable format";

/// The vision API reports no per-token confidence; each transcribed page
/// carries this fixed score, averaged into the document-level value.
const PAGE_CONFIDENCE: f64 = 0.9;

pub struct VisionExtractor {
    executor: CommandExecutor,
    provider: Arc<dyn CompletionProvider>,
    dpi: u32,
    temp_dir: PathBuf,
}

impl VisionExtractor {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        command_timeout: Duration,
        dpi: u32,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor: CommandExecutor::new(command_timeout),
            provider,
            dpi,
            temp_dir: temp_dir.into(),
        }
    }

    async fn render_pages(&self, file_path: &Path, page_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        tokio::fs::create_dir_all(page_dir).await?;

        let path = file_path.to_string_lossy();
        let prefix = page_dir.join("page");
        let prefix_str = prefix.to_string_lossy().into_owned();
        let dpi = self.dpi.to_string();

        self.executor
            .run("pdftoppm", &["-png", "-r", &dpi, &path, &prefix_str])
            .await?;

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(page_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                pages.push(path);
            }
        }
        // pdftoppm zero-pads page numbers, so name order is page order.
        pages.sort();

        if pages.is_empty() {
            return Err(ExtractError::BackendUnavailable(
                "no pages rendered from pdf".to_string(),
            ));
        }

        Ok(pages)
    }

    async fn transcribe(&self, pages: &[PathBuf]) -> Result<RawExtraction, ExtractError> {
        let mut combined = String::new();
        let mut confidence_sum = 0.0;

        for (index, page_path) in pages.iter().enumerate() {
            let page_number = index + 1;
            tracing::info!(page = page_number, "Transcribing page with vision model");

            let bytes = tokio::fs::read(page_path).await?;
            let encoded = BASE64_STANDARD.encode(&bytes);

            let text = self
                .provider
                .complete_with_image(OCR_SYSTEM_PROMPT, &encoded)
                .await?;

            combined.push_str(&format!("\n--- Page {} ---\n", page_number));
            combined.push_str(text.trim());
            confidence_sum += PAGE_CONFIDENCE;
        }

        let mean_confidence = confidence_sum / pages.len() as f64;

        Ok(RawExtraction {
            text: combined.trim().to_string(),
            page_count: pages.len() as i32,
            confidence: Some((mean_confidence * 100.0).round() as i32),
        })
    }
}

#[async_trait]
impl TextExtractor for VisionExtractor {
    fn backend(&self) -> ExtractionBackend {
        ExtractionBackend::Vision
    }

    async fn extract(&self, file_path: &Path) -> Result<RawExtraction, ExtractError> {
        let page_dir = self.temp_dir.join(format!("pages-{}", Uuid::new_v4()));

        let result = match self.render_pages(file_path, &page_dir).await {
            Ok(pages) => self.transcribe(&pages).await,
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&page_dir).await {
            tracing::debug!(dir = ?page_dir, error = %e, "Failed to remove page render dir");
        }

        if let Ok(raw) = &result {
            tracing::info!(
                page_count = raw.page_count,
                confidence = ?raw.confidence,
                text_length = raw.text.len(),
                "Vision extraction completed"
            );
        }

        result
    }
}
