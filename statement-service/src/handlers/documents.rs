use crate::dtos::{DocumentListParams, DocumentResponse, DocumentTextResponse, UploadRequest};
use crate::middleware::UserId;
use crate::models::Document;
use crate::startup::AppState;
use crate::workers::PipelineJob;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Upload a statement PDF. Returns immediately; extraction (and chained
/// parsing) run in the background.
pub async fn upload_document(
    State(state): State<AppState>,
    user_id: UserId,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut statement_id: Option<String> = None;
    let mut file_name: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        match field.name() {
            Some("statement_id") => {
                let value = field.text().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read statement_id: {}", e))
                })?;
                statement_id = Some(value);
            }
            Some("file") | Some("pdf_file") => {
                file_name = Some(field.file_name().unwrap_or("unnamed.pdf").to_string());
                let data = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e))
                })?;
                file_data = Some(data.to_vec());
            }
            _ => {}
        }
    }

    let request = UploadRequest {
        statement_id: statement_id
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing statement_id field")))?,
    };
    request.validate()?;

    let original_name =
        file_name.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;
    let data =
        file_data.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    if !original_name.to_lowercase().ends_with(".pdf") {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Only PDF files are allowed"
        )));
    }
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "File size must be less than 10MB"
        )));
    }

    // One in-flight document per statement.
    let existing = state
        .store
        .find_documents_by_statement(&request.statement_id)
        .await?;
    if existing.iter().any(|d| d.status.is_in_flight()) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Statement already has a document being processed"
        )));
    }

    let size = data.len() as i64;
    let storage_key = format!("{}/{}.pdf", Uuid::new_v4(), Uuid::new_v4());

    let document = Document::new(
        user_id.0,
        request.statement_id.clone(),
        original_name,
        size,
        storage_key.clone(),
    );

    tracing::info!(
        document_id = %document.id,
        statement_id = %document.statement_id,
        filename = %document.original_name,
        size = %size,
        "Document upload started"
    );

    state.storage.store(&storage_key, data).await.map_err(|e| {
        tracing::error!("Failed to store file {}: {}", storage_key, e);
        e
    })?;

    state.store.insert_document(&document).await.map_err(|e| {
        tracing::error!("Failed to insert document {}: {}", document.id, e);
        e
    })?;

    match &state.job_tx {
        Some(job_tx) => {
            let job = PipelineJob::ExtractText {
                document_id: document.id.clone(),
                chain_parsing: true,
            };
            if job_tx.send(job).await.is_err() {
                tracing::error!(document_id = %document.id, "Failed to enqueue extraction job");
                return Err(AppError::InternalError(anyhow::anyhow!(
                    "Worker queue unavailable"
                )));
            }
            tracing::info!(document_id = %document.id, "Extraction job enqueued");
        }
        None => {
            tracing::warn!(
                document_id = %document.id,
                "Worker pool disabled; document uploaded without scheduling extraction"
            );
        }
    }

    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user_id: UserId,
    Query(params): Query<DocumentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let documents = state
        .store
        .list_documents(&user_id.0, params.statement_id.as_deref())
        .await?;

    let responses: Vec<DocumentResponse> =
        documents.into_iter().map(DocumentResponse::from).collect();
    Ok(Json(responses))
}

pub async fn get_document(
    State(state): State<AppState>,
    user_id: UserId,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let document = find_owned_document(&state, &document_id, &user_id.0).await?;
    Ok(Json(DocumentResponse::from(document)))
}

/// Delete the stored file and the record together; the statement's
/// transactions go with its last document.
pub async fn delete_document(
    State(state): State<AppState>,
    user_id: UserId,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let document = find_owned_document(&state, &document_id, &user_id.0).await?;

    state.storage.delete(&document.storage_key).await?;
    state.store.delete_document(&document.id).await?;

    let remaining = state
        .store
        .find_documents_by_statement(&document.statement_id)
        .await?;
    if remaining.is_empty() {
        let deleted = state
            .store
            .delete_transactions(&document.statement_id)
            .await?;
        tracing::info!(
            statement_id = %document.statement_id,
            deleted_transactions = deleted,
            "Cascaded transaction delete with last statement document"
        );
    }

    tracing::info!(document_id = %document_id, "Document deleted");

    Ok(Json(json!({ "message": "Document deleted successfully" })))
}

/// Manually re-run extraction. Resets the completion flag for the
/// duration of the run; does not chain parsing.
pub async fn trigger_text_extraction(
    State(state): State<AppState>,
    user_id: UserId,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let document = find_owned_document(&state, &document_id, &user_id.0).await?;

    if document.status.is_in_flight() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Document is already being processed"
        )));
    }

    let job_tx = state.job_tx.as_ref().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!("Worker pool not available"))
    })?;

    let job = PipelineJob::ExtractText {
        document_id: document.id.clone(),
        chain_parsing: false,
    };
    job_tx.send(job).await.map_err(|_| {
        tracing::error!(document_id = %document.id, "Failed to enqueue extraction job");
        AppError::InternalError(anyhow::anyhow!("Worker queue unavailable"))
    })?;

    tracing::info!(document_id = %document.id, "Manual extraction re-triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Text extraction started in background" })),
    ))
}

/// Both extraction results, verbatim, plus their structural comparison.
pub async fn get_document_text(
    State(state): State<AppState>,
    user_id: UserId,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let document = find_owned_document(&state, &document_id, &user_id.0).await?;
    Ok(Json(DocumentTextResponse::from(document)))
}

async fn find_owned_document(
    state: &AppState,
    document_id: &str,
    owner_id: &str,
) -> Result<Document, AppError> {
    state
        .store
        .find_document(document_id)
        .await?
        .filter(|d| d.owner_id == owner_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Document not found")))
}
