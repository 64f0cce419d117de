use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a document as it moves through the pipeline.
///
/// Failure is not a distinct state: a failed stage still advances the
/// document, with the failure recorded in the error fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Extracting,
    Extracted,
    Parsing,
    Done,
}

impl DocumentStatus {
    /// True while a background stage owns this document.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DocumentStatus::Extracting | DocumentStatus::Parsing)
    }
}

/// Outcome of one extraction backend run.
///
/// A backend that has never been attempted is represented as `None` on the
/// document, not as a default value of this struct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionState {
    pub success: bool,
    pub text: Option<String>,
    pub word_count: i32,
    pub page_count: i32,
    pub error: Option<String>,
    /// 0-100, vision backend only.
    pub confidence: Option<i32>,
}

impl ExtractionState {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Text usable by the parser: present and non-empty.
    pub fn usable_text(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub statement_id: String,
    pub original_name: String,
    pub size: i64,
    pub storage_key: String,
    pub status: DocumentStatus,
    pub layout: Option<ExtractionState>,
    pub vision: Option<ExtractionState>,
    pub text_processing_completed: bool,
    pub text_processing_error: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        owner_id: String,
        statement_id: String,
        original_name: String,
        size: i64,
        storage_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            statement_id,
            original_name,
            size,
            storage_key,
            status: DocumentStatus::Uploaded,
            layout: None,
            vision: None,
            text_processing_completed: false,
            text_processing_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Both backends have been attempted at least once.
    pub fn extraction_settled(&self) -> bool {
        self.layout.is_some() && self.vision.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_starts_unprocessed() {
        let doc = Document::new(
            "user-1".into(),
            "stmt-1".into(),
            "statement.pdf".into(),
            1024,
            "abc/def.pdf".into(),
        );
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert!(!doc.text_processing_completed);
        assert!(!doc.extraction_settled());
    }

    #[test]
    fn usable_text_rejects_failed_and_blank_states() {
        let failed = ExtractionState::failed("boom");
        assert!(failed.usable_text().is_none());

        let blank = ExtractionState {
            success: true,
            text: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.usable_text().is_none());

        let ok = ExtractionState {
            success: true,
            text: Some("hello world".into()),
            word_count: 2,
            page_count: 1,
            ..Default::default()
        };
        assert_eq!(ok.usable_text(), Some("hello world"));
    }
}
