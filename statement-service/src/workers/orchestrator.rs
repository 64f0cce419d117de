//! Background pipeline: job queue, worker pool, and the per-document
//! state machine (uploaded → extracting → extracted → parsing → done).
//!
//! A stage failure never escapes a worker: it is written into the entity's
//! error fields and the completion flags are still set, so nothing stays
//! "processing" forever.

use crate::config::WorkerConfig;
use crate::models::{Document, DocumentStatus, ExtractionState, Transaction};
use crate::services::database::RecordStore;
use crate::services::storage::Storage;
use crate::workers::extractor::{attempt, ExtractionBackend, TextExtractor};
use crate::workers::parser::{ParseFailure, TransactionParser};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Bound on retrying the file-store read. External API calls are
/// single-attempt; only the local storage read gets a second chance.
const DOWNLOAD_RETRY_CAP: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum PipelineJob {
    ExtractText {
        document_id: String,
        chain_parsing: bool,
    },
    ParseTransactions {
        statement_id: String,
    },
}

pub struct PipelineOrchestrator {
    config: WorkerConfig,
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn Storage>,
    extractors: Vec<Arc<dyn TextExtractor>>,
    parser: Arc<TransactionParser>,
    job_tx: mpsc::Sender<PipelineJob>,
    job_rx: Option<mpsc::Receiver<PipelineJob>>,
    shutdown_token: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn Storage>,
        extractors: Vec<Arc<dyn TextExtractor>>,
        parser: Arc<TransactionParser>,
    ) -> (Self, mpsc::Sender<PipelineJob>) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_size);
        let shutdown_token = CancellationToken::new();

        let orchestrator = Self {
            config,
            store,
            storage,
            extractors,
            parser,
            job_tx: job_tx.clone(),
            job_rx: Some(job_rx),
            shutdown_token,
        };

        (orchestrator, job_tx)
    }

    pub async fn start(mut self) {
        if !self.config.enabled {
            tracing::info!("Pipeline worker pool disabled by configuration");
            return;
        }

        let mut job_rx = self.job_rx.take().expect("start() can only be called once");

        tracing::info!(
            worker_count = self.config.worker_count,
            "Starting pipeline worker pool"
        );

        let mut workers = Vec::new();
        for worker_id in 0..self.config.worker_count {
            workers.push(
                PipelineWorker::new(
                    self.store.clone(),
                    self.storage.clone(),
                    self.extractors.clone(),
                    self.parser.clone(),
                    self.config.temp_dir.clone(),
                )
                .with_id(worker_id)
                .with_queue(self.job_tx.clone()),
            );
        }

        let shutdown = self.shutdown_token.clone();

        tokio::spawn(async move {
            let mut next_worker = 0;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Job dispatcher shutting down");
                        break;
                    }
                    job = job_rx.recv() => {
                        match job {
                            Some(job) => {
                                let worker = workers[next_worker].clone();
                                next_worker = (next_worker + 1) % workers.len();

                                tracing::info!(
                                    worker_id = worker.id,
                                    job = ?job,
                                    "Dispatching pipeline job"
                                );

                                tokio::spawn(async move {
                                    worker.process_job(job).await;
                                });
                            }
                            None => {
                                tracing::info!("Job channel closed, dispatcher exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        tracing::info!("Initiating pipeline worker pool shutdown");
        self.shutdown_token.cancel();
    }
}

/// Executes pipeline stages. Public so tests (or any caller that wants
/// synchronous behavior) can drive stages directly without the queue.
#[derive(Clone)]
pub struct PipelineWorker {
    id: usize,
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn Storage>,
    extractors: Vec<Arc<dyn TextExtractor>>,
    parser: Arc<TransactionParser>,
    temp_dir: PathBuf,
    job_tx: Option<mpsc::Sender<PipelineJob>>,
}

impl PipelineWorker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn Storage>,
        extractors: Vec<Arc<dyn TextExtractor>>,
        parser: Arc<TransactionParser>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: 0,
            store,
            storage,
            extractors,
            parser,
            temp_dir: temp_dir.into(),
            job_tx: None,
        }
    }

    fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    fn with_queue(mut self, job_tx: mpsc::Sender<PipelineJob>) -> Self {
        self.job_tx = Some(job_tx);
        self
    }

    pub async fn process_job(&self, job: PipelineJob) {
        match job {
            PipelineJob::ExtractText {
                document_id,
                chain_parsing,
            } => self.run_extraction(&document_id, chain_parsing).await,
            PipelineJob::ParseTransactions { statement_id } => {
                self.run_parsing(&statement_id).await
            }
        }
    }

    /// Extraction stage: run both backends over the stored file and
    /// reconcile both outcomes onto the document.
    pub async fn run_extraction(&self, document_id: &str, chain_parsing: bool) {
        let start = Instant::now();

        let mut document = match self.store.find_document(document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                tracing::error!(document_id = %document_id, "Document not found for extraction");
                return;
            }
            Err(e) => {
                tracing::error!(document_id = %document_id, error = %e, "Failed to load document");
                return;
            }
        };

        metrics::counter!("statement_extraction_total").increment(1);

        // A re-run resets completion for its duration; it never carries a
        // stale error across runs.
        document.status = DocumentStatus::Extracting;
        document.text_processing_completed = false;
        document.text_processing_error = None;
        document.touch();
        self.write_document(&document).await;

        match self.download_to_temp(&document).await {
            Ok(temp_file) => {
                for extractor in &self.extractors {
                    let state = attempt(extractor.as_ref(), &temp_file).await;
                    match extractor.backend() {
                        ExtractionBackend::Layout => document.layout = Some(state),
                        ExtractionBackend::Vision => document.vision = Some(state),
                    }
                }
                let _ = tokio::fs::remove_file(&temp_file).await;
            }
            Err(message) => {
                // Without the file neither backend can run; record the
                // failure as both backends' outcome so the document still
                // settles.
                document.layout = Some(ExtractionState::failed(message.clone()));
                document.vision = Some(ExtractionState::failed(message));
            }
        }

        let both_failed = !document
            .layout
            .as_ref()
            .map(|s| s.success)
            .unwrap_or(false)
            && !document.vision.as_ref().map(|s| s.success).unwrap_or(false);

        if both_failed {
            let mut messages = Vec::new();
            if let Some(error) = document.layout.as_ref().and_then(|s| s.error.clone()) {
                messages.push(format!("layout: {}", error));
            }
            if let Some(error) = document.vision.as_ref().and_then(|s| s.error.clone()) {
                messages.push(format!("vision: {}", error));
            }
            document.text_processing_error = Some(messages.join("; "));
            metrics::counter!("statement_extraction_failed").increment(1);
        } else {
            metrics::counter!("statement_extraction_success").increment(1);
        }

        document.text_processing_completed = true;
        document.status = DocumentStatus::Extracted;
        document.touch();
        self.write_document(&document).await;

        metrics::histogram!("statement_extraction_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        tracing::info!(
            worker_id = self.id,
            document_id = %document_id,
            duration_ms = start.elapsed().as_millis(),
            both_failed = both_failed,
            "Extraction stage finished"
        );

        if chain_parsing {
            if let Some(job_tx) = &self.job_tx {
                let job = PipelineJob::ParseTransactions {
                    statement_id: document.statement_id.clone(),
                };
                if job_tx.send(job).await.is_err() {
                    tracing::error!(
                        statement_id = %document.statement_id,
                        "Failed to enqueue chained parsing job"
                    );
                }
            }
        }
    }

    /// Parsing stage: parse every completed document of the statement and
    /// atomically replace the statement's transaction set.
    pub async fn run_parsing(&self, statement_id: &str) {
        let start = Instant::now();

        let documents = match self.store.find_documents_by_statement(statement_id).await {
            Ok(documents) => documents,
            Err(e) => {
                tracing::error!(statement_id = %statement_id, error = %e, "Failed to load statement documents");
                return;
            }
        };

        let mut completed: Vec<Document> = documents
            .into_iter()
            .filter(|d| d.text_processing_completed)
            .collect();

        if completed.is_empty() {
            tracing::warn!(
                statement_id = %statement_id,
                "No documents with completed text extraction for statement"
            );
            return;
        }

        metrics::counter!("statement_parsing_total").increment(1);

        for document in &mut completed {
            document.status = DocumentStatus::Parsing;
            document.touch();
            self.write_document(document).await;
        }

        let mut transactions: Vec<Transaction> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut last_raw: Option<String> = None;
        let mut any_text = false;

        for document in &completed {
            let Some((text, source)) = TransactionParser::select_text(document) else {
                continue;
            };
            any_text = true;

            tracing::info!(
                statement_id = %statement_id,
                document_id = %document.id,
                text_source = source.as_str(),
                "Parsing transactions from extracted text"
            );

            let run = self.parser.parse_statement_text(statement_id, text).await;
            if let Some(error) = run.error {
                errors.push(error);
            }
            if run.raw_response.is_some() {
                last_raw = run.raw_response;
            }
            transactions.extend(run.transactions);
        }

        if !any_text {
            errors.push(ParseFailure::NoTextAvailable.to_string());
        }

        // A failed run must stay visible: persist a placeholder row rather
        // than an empty, healthy-looking set.
        if transactions.is_empty() && !errors.is_empty() {
            transactions.push(Transaction::failed(
                statement_id.to_string(),
                errors.join("; "),
                last_raw.clone(),
            ));
            metrics::counter!("statement_parsing_failed").increment(1);
        } else {
            metrics::counter!("statement_parsing_success").increment(1);
        }

        let stored = transactions.len();
        match self
            .store
            .replace_transactions(statement_id, transactions)
            .await
        {
            Ok(count) => {
                tracing::info!(
                    statement_id = %statement_id,
                    count = count,
                    "Replaced statement transaction set"
                );
            }
            Err(e) => {
                // Replace is atomic: the prior rows are still intact.
                tracing::error!(
                    statement_id = %statement_id,
                    attempted = stored,
                    error = %e,
                    "Failed to persist transaction set"
                );
            }
        }

        for document in &mut completed {
            document.status = DocumentStatus::Done;
            document.touch();
            self.write_document(document).await;
        }

        metrics::histogram!("statement_parsing_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        tracing::info!(
            worker_id = self.id,
            statement_id = %statement_id,
            duration_ms = start.elapsed().as_millis(),
            "Parsing stage finished"
        );
    }

    async fn download_to_temp(&self, document: &Document) -> Result<PathBuf, String> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(DOWNLOAD_RETRY_CAP),
            ..Default::default()
        };

        let data = retry(backoff, || async {
            self.storage
                .read(&document.storage_key)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
        .map_err(|e| format!("stored file unavailable: {}", e))?;

        let temp_file = self
            .temp_dir
            .join(format!("{}_{}.pdf", document.id, Uuid::new_v4()));

        if let Some(parent) = temp_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create temp dir: {}", e))?;
        }
        tokio::fs::write(&temp_file, data)
            .await
            .map_err(|e| format!("failed to write temp file: {}", e))?;

        Ok(temp_file)
    }

    async fn write_document(&self, document: &Document) {
        if let Err(e) = self.store.update_document(document).await {
            tracing::error!(
                document_id = %document.id,
                error = %e,
                "Failed to persist document state"
            );
        }
    }
}
