//! Layout-based extraction: deterministic text from the PDF's embedded
//! text layer via poppler's pdftotext/pdfinfo. Fast and free, but yields
//! nothing for scanned documents.

use crate::workers::executor::CommandExecutor;
use crate::workers::extractor::{ExtractError, ExtractionBackend, RawExtraction, TextExtractor};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub struct LayoutExtractor {
    executor: CommandExecutor,
}

impl LayoutExtractor {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            executor: CommandExecutor::new(command_timeout),
        }
    }
}

#[async_trait]
impl TextExtractor for LayoutExtractor {
    fn backend(&self) -> ExtractionBackend {
        ExtractionBackend::Layout
    }

    async fn extract(&self, file_path: &Path) -> Result<RawExtraction, ExtractError> {
        let path = file_path.to_string_lossy();

        let output = self
            .executor
            .run("pdftotext", &["-layout", "-enc", "UTF-8", &path, "-"])
            .await?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();

        let info = self.executor.run("pdfinfo", &[&path]).await?;
        let page_count = parse_page_count(&info.stdout)?;

        tracing::info!(
            page_count = page_count,
            text_length = text.len(),
            "Layout extraction completed"
        );

        Ok(RawExtraction {
            text,
            page_count,
            confidence: None,
        })
    }
}

fn parse_page_count(output: &[u8]) -> Result<i32, ExtractError> {
    let output_str = String::from_utf8_lossy(output);

    for line in output_str.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            return rest.trim().parse::<i32>().map_err(|e| {
                ExtractError::BackendUnavailable(format!("failed to parse page count: {}", e))
            });
        }
    }

    Err(ExtractError::BackendUnavailable(
        "page count not found in pdfinfo output".to_string(),
    ))
}
