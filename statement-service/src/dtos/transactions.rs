use crate::models::{ExtractionSource, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: String,
    pub statement_id: String,
    pub transaction_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub transaction_type: Option<String>,
    pub balance: Option<Decimal>,
    pub reference_number: Option<String>,
    pub category: Option<String>,
    pub extraction_source: ExtractionSource,
    pub confidence_score: f64,
    pub processing_completed: bool,
    pub processing_error: Option<String>,
    pub created_at: String,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            statement_id: tx.statement_id,
            transaction_date: tx.transaction_date,
            description: tx.description,
            amount: tx.amount,
            transaction_type: tx.transaction_type,
            balance: tx.balance,
            reference_number: tx.reference_number,
            category: tx.category,
            extraction_source: tx.extraction_source,
            confidence_score: tx.confidence_score,
            processing_completed: tx.processing_completed,
            processing_error: tx.processing_error,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionExtractionResponse {
    pub statement_id: String,
    pub total_transactions: usize,
    pub successful_extractions: usize,
    pub failed_extractions: usize,
    pub message: String,
    pub transactions: Vec<TransactionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteTransactionsResponse {
    pub statement_id: String,
    pub deleted_count: u64,
    pub message: String,
}
