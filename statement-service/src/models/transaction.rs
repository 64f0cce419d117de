use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a piece of extracted data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionSource {
    Layout,
    Vision,
    LanguageModel,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Vision => "vision",
            Self::LanguageModel => "language-model",
        }
    }
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transaction parsed from a statement.
///
/// The full row set for a statement is replaced wholesale on every
/// parsing run; rows never survive a re-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub statement_id: String,
    pub transaction_date: Option<NaiveDate>,
    pub description: Option<String>,
    /// Negative = debit, positive = credit.
    pub amount: Option<Decimal>,
    pub transaction_type: Option<String>,
    pub balance: Option<Decimal>,
    pub reference_number: Option<String>,
    pub category: Option<String>,
    pub extraction_source: ExtractionSource,
    /// [0,1]; only meaningful for language-model sourced rows.
    pub confidence_score: f64,
    pub llm_raw_response: Option<String>,
    pub processing_completed: bool,
    pub processing_error: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(statement_id: String, source: ExtractionSource, confidence_score: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            statement_id,
            transaction_date: None,
            description: None,
            amount: None,
            transaction_type: None,
            balance: None,
            reference_number: None,
            category: None,
            extraction_source: source,
            confidence_score,
            llm_raw_response: None,
            processing_completed: true,
            processing_error: None,
            created_at: Utc::now(),
        }
    }

    /// Placeholder row recording a parsing failure so the statement does
    /// not silently end up with an empty, healthy-looking set.
    pub fn failed(statement_id: String, error: String, raw_response: Option<String>) -> Self {
        let mut tx = Self::new(statement_id, ExtractionSource::LanguageModel, 0.0);
        tx.description = Some(format!("Transaction extraction failed: {}", error));
        tx.processing_completed = false;
        tx.processing_error = Some(error);
        tx.llm_raw_response = raw_response;
        tx
    }

    /// Amount sign agrees with the transaction type label.
    pub fn sign_consistent(&self) -> bool {
        let (Some(amount), Some(kind)) = (self.amount, self.transaction_type.as_deref()) else {
            return true;
        };
        match kind {
            "debit" | "withdrawal" | "payment" | "purchase" | "fee" => amount <= Decimal::ZERO,
            "credit" | "deposit" | "refund" | "interest" => amount >= Decimal::ZERO,
            _ => true,
        }
    }
}
