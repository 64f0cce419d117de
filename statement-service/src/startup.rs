use crate::config::StatementConfig;
use crate::handlers;
use crate::services::llm::{CompletionProvider, GroqProvider, GroqSettings};
use crate::services::{LocalStorage, MongoStore, RecordStore, Storage};
use crate::workers::{
    LayoutExtractor, PipelineJob, PipelineOrchestrator, TextExtractor, TransactionParser,
    VisionExtractor,
};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub storage: Arc<dyn Storage>,
    pub job_tx: Option<mpsc::Sender<PipelineJob>>,
}

/// The full HTTP surface over a prepared state. Split out so tests can
/// drive the router without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/documents",
            post(handlers::upload_document).get(handlers::list_documents),
        )
        .route(
            "/documents/:document_id",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        .route(
            "/documents/:document_id/extract-text",
            post(handlers::trigger_text_extraction),
        )
        .route(
            "/documents/:document_id/text",
            get(handlers::get_document_text),
        )
        .route(
            "/statements/:statement_id/transactions",
            get(handlers::list_statement_transactions)
                .delete(handlers::delete_statement_transactions),
        )
        .route(
            "/statements/:statement_id/extract-transactions",
            post(handlers::trigger_transaction_extraction),
        )
        .route(
            "/statements/:statement_id/transactions/summary",
            get(handlers::get_transaction_summary),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: StatementConfig) -> Result<Self, AppError> {
        let db = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;
        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;
        let store: Arc<dyn RecordStore> = Arc::new(db);

        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(&config.storage.local_path)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to initialize local storage at {}: {}",
                        config.storage.local_path,
                        e
                    );
                    e
                })?,
        );

        let provider: Arc<dyn CompletionProvider> = Arc::new(GroqProvider::new(GroqSettings {
            api_key: config.groq.api_key.clone(),
            text_model: config.groq.text_model.clone(),
            vision_model: config.groq.vision_model.clone(),
            request_timeout_secs: config.groq.request_timeout_secs,
        }));

        let extractors: Vec<Arc<dyn TextExtractor>> = vec![
            Arc::new(LayoutExtractor::new(config.worker.command_timeout())),
            Arc::new(VisionExtractor::new(
                provider.clone(),
                config.worker.command_timeout(),
                config.extraction.dpi,
                &config.worker.temp_dir,
            )),
        ];

        let parser = Arc::new(TransactionParser::new(
            provider,
            config.extraction.max_prompt_chars,
        ));

        let (orchestrator, job_tx) = PipelineOrchestrator::new(
            config.worker.clone(),
            store.clone(),
            storage.clone(),
            extractors,
            parser,
        );
        let job_tx = if config.worker.enabled {
            Some(job_tx)
        } else {
            None
        };
        tokio::spawn(async move {
            orchestrator.start().await;
        });

        let state = AppState {
            store,
            storage,
            job_tx,
        };

        let app = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
