use crate::models::{Document, DocumentStatus, ExtractionState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

/// Upload form fields (the file itself arrives as a multipart part).
#[derive(Debug, Deserialize, Validate)]
pub struct UploadRequest {
    #[validate(length(min = 1, max = 255))]
    pub statement_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentListParams {
    pub statement_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: String,
    pub owner_id: String,
    pub statement_id: String,
    pub original_name: String,
    pub size: i64,
    pub status: DocumentStatus,
    pub layout_extraction_success: Option<bool>,
    pub layout_word_count: Option<i32>,
    pub layout_page_count: Option<i32>,
    pub vision_extraction_success: Option<bool>,
    pub vision_word_count: Option<i32>,
    pub vision_page_count: Option<i32>,
    pub vision_confidence: Option<i32>,
    pub text_processing_completed: bool,
    pub text_processing_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            owner_id: doc.owner_id,
            statement_id: doc.statement_id,
            original_name: doc.original_name,
            size: doc.size,
            status: doc.status,
            layout_extraction_success: doc.layout.as_ref().map(|s| s.success),
            layout_word_count: doc.layout.as_ref().map(|s| s.word_count),
            layout_page_count: doc.layout.as_ref().map(|s| s.page_count),
            vision_extraction_success: doc.vision.as_ref().map(|s| s.success),
            vision_word_count: doc.vision.as_ref().map(|s| s.word_count),
            vision_page_count: doc.vision.as_ref().map(|s| s.page_count),
            vision_confidence: doc.vision.as_ref().and_then(|s| s.confidence),
            text_processing_completed: doc.text_processing_completed,
            text_processing_error: doc.text_processing_error,
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

/// One backend's verbatim extraction outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackendText {
    pub success: bool,
    pub text: Option<String>,
    pub word_count: i32,
    pub page_count: i32,
    pub error: Option<String>,
    pub confidence: Option<i32>,
}

impl From<ExtractionState> for BackendText {
    fn from(state: ExtractionState) -> Self {
        Self {
            success: state.success,
            text: state.text,
            word_count: state.word_count,
            page_count: state.page_count,
            error: state.error,
            confidence: state.confidence,
        }
    }
}

/// Structural diff of the two extraction outcomes. No winner is picked;
/// this exists for inspection only.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionComparison {
    pub layout_present: bool,
    pub vision_present: bool,
    /// vision word count minus layout word count, when both succeeded.
    pub word_count_delta: Option<i32>,
    pub vision_confidence: Option<i32>,
    /// Word-overlap similarity in [0,1], when both succeeded.
    pub similarity_score: Option<f64>,
}

impl ExtractionComparison {
    pub fn from_document(doc: &Document) -> Self {
        let layout_ok = doc.layout.as_ref().filter(|s| s.success);
        let vision_ok = doc.vision.as_ref().filter(|s| s.success);

        let word_count_delta = match (layout_ok, vision_ok) {
            (Some(layout), Some(vision)) => Some(vision.word_count - layout.word_count),
            _ => None,
        };

        let similarity_score = match (
            layout_ok.and_then(|s| s.text.as_deref()),
            vision_ok.and_then(|s| s.text.as_deref()),
        ) {
            (Some(layout_text), Some(vision_text)) => {
                word_overlap_similarity(layout_text, vision_text)
            }
            _ => None,
        };

        Self {
            layout_present: layout_ok.is_some(),
            vision_present: vision_ok.is_some(),
            word_count_delta,
            vision_confidence: doc.vision.as_ref().and_then(|s| s.confidence),
            similarity_score,
        }
    }
}

/// Jaccard similarity over lowercased word sets.
fn word_overlap_similarity(a: &str, b: &str) -> Option<f64> {
    let words_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();

    if words_a.is_empty() || words_b.is_empty() {
        return None;
    }

    let overlap = words_a.intersection(&words_b).count();
    let total_unique = words_a.union(&words_b).count();
    Some(overlap as f64 / total_unique as f64)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentTextResponse {
    pub document_id: String,
    pub layout: Option<BackendText>,
    pub vision: Option<BackendText>,
    pub processing_completed: bool,
    pub error: Option<String>,
    pub comparison: ExtractionComparison,
}

impl From<Document> for DocumentTextResponse {
    fn from(doc: Document) -> Self {
        let comparison = ExtractionComparison::from_document(&doc);
        Self {
            document_id: doc.id,
            layout: doc.layout.map(BackendText::from),
            vision: doc.vision.map(BackendText::from),
            processing_completed: doc.text_processing_completed,
            error: doc.text_processing_error,
            comparison,
        }
    }
}
