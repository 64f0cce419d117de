#![allow(dead_code)]

use async_trait::async_trait;
use service_core::error::AppError;
use statement_service::models::{Document, DocumentStatus, ExtractionState};
use statement_service::services::database::{MemoryStore, RecordStore};
use statement_service::services::llm::CompletionProvider;
use statement_service::services::storage::Storage;
use statement_service::workers::{
    ExtractError, ExtractionBackend, PipelineWorker, RawExtraction, TextExtractor,
    TransactionParser,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory file store so the pipeline tests touch no real storage
/// backend.
#[derive(Default)]
pub struct MemStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStorage {
    pub fn with_file(key: &str, data: &[u8]) -> Arc<Self> {
        let storage = Self::default();
        storage
            .files
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Arc::new(storage)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn store(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        self.files.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, AppError> {
        self.files
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("no such file: {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.files.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Extraction backend returning a canned outcome.
pub struct StubExtractor {
    backend: ExtractionBackend,
    result: Result<RawExtraction, String>,
}

#[async_trait]
impl TextExtractor for StubExtractor {
    fn backend(&self) -> ExtractionBackend {
        self.backend
    }

    async fn extract(&self, _file_path: &std::path::Path) -> Result<RawExtraction, ExtractError> {
        match &self.result {
            Ok(raw) => Ok(raw.clone()),
            Err(message) => Err(ExtractError::BackendUnavailable(message.clone())),
        }
    }
}

pub fn layout_ok(text: &str) -> Arc<dyn TextExtractor> {
    Arc::new(StubExtractor {
        backend: ExtractionBackend::Layout,
        result: Ok(RawExtraction {
            text: text.to_string(),
            page_count: 1,
            confidence: None,
        }),
    })
}

pub fn layout_err(message: &str) -> Arc<dyn TextExtractor> {
    Arc::new(StubExtractor {
        backend: ExtractionBackend::Layout,
        result: Err(message.to_string()),
    })
}

pub fn vision_ok(text: &str, confidence: i32) -> Arc<dyn TextExtractor> {
    Arc::new(StubExtractor {
        backend: ExtractionBackend::Vision,
        result: Ok(RawExtraction {
            text: text.to_string(),
            page_count: 1,
            confidence: Some(confidence),
        }),
    })
}

pub fn vision_err(message: &str) -> Arc<dyn TextExtractor> {
    Arc::new(StubExtractor {
        backend: ExtractionBackend::Vision,
        result: Err(message.to_string()),
    })
}

/// Backend that records the document's completion flag at the moment it
/// runs, to observe the mid-run state of a re-triggered extraction.
pub struct ObservingExtractor {
    pub backend: ExtractionBackend,
    pub store: Arc<MemoryStore>,
    pub document_id: String,
    pub observed_completed: Arc<Mutex<Option<bool>>>,
}

#[async_trait]
impl TextExtractor for ObservingExtractor {
    fn backend(&self) -> ExtractionBackend {
        self.backend
    }

    async fn extract(&self, _file_path: &std::path::Path) -> Result<RawExtraction, ExtractError> {
        let document = self
            .store
            .find_document(&self.document_id)
            .await
            .unwrap()
            .unwrap();
        *self.observed_completed.lock().unwrap() = Some(document.text_processing_completed);

        Ok(RawExtraction {
            text: "observed run".to_string(),
            page_count: 1,
            confidence: None,
        })
    }
}

pub fn build_worker(
    store: Arc<MemoryStore>,
    storage: Arc<dyn Storage>,
    extractors: Vec<Arc<dyn TextExtractor>>,
    provider: Arc<dyn CompletionProvider>,
) -> PipelineWorker {
    let parser = Arc::new(TransactionParser::new(provider, 10_000));
    PipelineWorker::new(store, storage, extractors, parser, std::env::temp_dir())
}

pub async fn seed_document(store: &MemoryStore, owner_id: &str, statement_id: &str) -> Document {
    let document = Document::new(
        owner_id.to_string(),
        statement_id.to_string(),
        "statement.pdf".to_string(),
        1024,
        format!("{}/file.pdf", statement_id),
    );
    store.insert_document(&document).await.unwrap();
    document
}

/// Document whose extraction already settled with the given texts.
pub async fn seed_extracted_document(
    store: &MemoryStore,
    owner_id: &str,
    statement_id: &str,
    layout_text: Option<&str>,
    vision_text: Option<&str>,
) -> Document {
    let mut document = seed_document(store, owner_id, statement_id).await;
    document.layout = Some(match layout_text {
        Some(text) => extraction_state(text, None),
        None => ExtractionState::failed("no text layer"),
    });
    document.vision = Some(match vision_text {
        Some(text) => extraction_state(text, Some(90)),
        None => ExtractionState::failed("vision backend failed"),
    });
    document.text_processing_completed = true;
    document.status = DocumentStatus::Extracted;
    store.update_document(&document).await.unwrap();
    document
}

pub fn extraction_state(text: &str, confidence: Option<i32>) -> ExtractionState {
    ExtractionState {
        success: true,
        word_count: text.split_whitespace().count() as i32,
        page_count: 1,
        text: Some(text.to_string()),
        error: None,
        confidence,
    }
}

/// Two rows: a debit the model mis-signs as positive, and a deposit it
/// mis-signs as negative. Sign normalization must fix both.
pub fn model_response_a() -> String {
    serde_json::json!({
        "transactions": [
            {
                "transaction_date": "2024-01-15",
                "description": "WALMART SUPERCENTER",
                "amount": 125.50,
                "transaction_type": "debit",
                "balance": 1875.32,
                "reference_number": "4567",
                "confidence": 0.95
            },
            {
                "transaction_date": "2024-01-20",
                "description": "ACME CORP PAYROLL",
                "amount": -1500.00,
                "transaction_type": "deposit",
                "balance": 3375.32
            }
        ],
        "confidence": 0.9,
        "total_found": 2
    })
    .to_string()
}

pub fn model_response_b() -> String {
    serde_json::json!({
        "transactions": [
            { "transaction_date": "2024-02-01", "description": "SHELL GAS STATION", "amount": -40.00, "transaction_type": "debit" },
            { "transaction_date": "2024-02-03", "description": "NETFLIX SUBSCRIPTION", "amount": -15.49, "transaction_type": "debit" },
            { "transaction_date": "2024-02-05", "description": "REFUND ORDER 9921", "amount": 20.00, "transaction_type": "refund" }
        ],
        "confidence": 0.85,
        "total_found": 3
    })
    .to_string()
}
