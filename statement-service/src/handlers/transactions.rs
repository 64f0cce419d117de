use crate::dtos::{
    DeleteTransactionsResponse, TransactionExtractionResponse, TransactionResponse,
};
use crate::middleware::UserId;
use crate::models::Document;
use crate::services::summary::compute_summary;
use crate::startup::AppState;
use crate::workers::PipelineJob;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

pub async fn list_statement_transactions(
    State(state): State<AppState>,
    user_id: UserId,
    Path(statement_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    find_owned_statement(&state, &statement_id, &user_id.0).await?;

    let transactions = state.store.list_transactions(&statement_id).await?;
    let responses: Vec<TransactionResponse> = transactions
        .into_iter()
        .map(TransactionResponse::from)
        .collect();
    Ok(Json(responses))
}

/// Manually re-run transaction parsing for a statement. Returns the
/// current (possibly stale) transaction set immediately.
pub async fn trigger_transaction_extraction(
    State(state): State<AppState>,
    user_id: UserId,
    Path(statement_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let documents = find_owned_statement(&state, &statement_id, &user_id.0).await?;

    if !documents.iter().any(|d| d.text_processing_completed) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Text extraction not completed. Please wait for text processing to finish."
        )));
    }
    if documents.iter().any(|d| d.status.is_in_flight()) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Statement already has a document being processed"
        )));
    }

    let job_tx = state.job_tx.as_ref().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!("Worker pool not available"))
    })?;

    let job = PipelineJob::ParseTransactions {
        statement_id: statement_id.clone(),
    };
    job_tx.send(job).await.map_err(|_| {
        tracing::error!(statement_id = %statement_id, "Failed to enqueue parsing job");
        AppError::InternalError(anyhow::anyhow!("Worker queue unavailable"))
    })?;

    let existing = state.store.list_transactions(&statement_id).await?;
    let successful = existing.iter().filter(|t| t.processing_completed).count();
    let failed = existing.len() - successful;

    let response = TransactionExtractionResponse {
        statement_id: statement_id.clone(),
        total_transactions: existing.len(),
        successful_extractions: successful,
        failed_extractions: failed,
        message: "Transaction extraction started in background. Existing transactions returned."
            .to_string(),
        transactions: existing.into_iter().map(TransactionResponse::from).collect(),
    };

    tracing::info!(statement_id = %statement_id, "Manual transaction extraction triggered");

    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn delete_statement_transactions(
    State(state): State<AppState>,
    user_id: UserId,
    Path(statement_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    find_owned_statement(&state, &statement_id, &user_id.0).await?;

    let deleted_count = state.store.delete_transactions(&statement_id).await?;

    tracing::info!(
        statement_id = %statement_id,
        deleted_count = deleted_count,
        "Deleted statement transactions"
    );

    Ok(Json(DeleteTransactionsResponse {
        message: format!(
            "Successfully deleted {} transactions for statement {}",
            deleted_count, statement_id
        ),
        statement_id,
        deleted_count,
    }))
}

pub async fn get_transaction_summary(
    State(state): State<AppState>,
    user_id: UserId,
    Path(statement_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    find_owned_statement(&state, &statement_id, &user_id.0).await?;

    let transactions = state.store.list_transactions(&statement_id).await?;
    let summary = compute_summary(&statement_id, &transactions);
    Ok(Json(summary))
}

/// The statement must exist and belong to the caller; its documents are
/// returned for further checks.
async fn find_owned_statement(
    state: &AppState,
    statement_id: &str,
    owner_id: &str,
) -> Result<Vec<Document>, AppError> {
    let documents = state.store.find_documents_by_statement(statement_id).await?;
    let owned: Vec<Document> = documents
        .into_iter()
        .filter(|d| d.owner_id == owner_id)
        .collect();

    if owned.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Statement not found or access denied"
        )));
    }
    Ok(owned)
}
