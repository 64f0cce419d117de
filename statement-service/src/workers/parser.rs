//! Transaction parsing: prompt a language model with consolidated
//! statement text and defensively turn its free-text reply into
//! normalized transaction rows.

use crate::models::{Document, ExtractionSource, Transaction};
use crate::services::llm::{CompletionProvider, ProviderError};
use crate::workers::extractor::ExtractionBackend;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Trust assigned to a model-reported row when the model gives no score of
/// its own. Deterministic extraction would score 1.0.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_REFERENCE_LEN: usize = 255;

const SYSTEM_PROMPT: &str = "\
You are an expert financial document processor specializing in extracting \
transaction details from bank statements, credit card statements, and other \
financial documents.

Your task is to extract individual transactions from the provided statement \
text and return them in a structured JSON format.

For each transaction, extract the following information when available:
- transaction_date: Date of the transaction (YYYY-MM-DD format)
- description: Full description of the transaction
- amount: Transaction amount (positive for credits, negative for debits)
- transaction_type: Type (debit, credit, withdrawal, deposit, etc.)
- balance: Account balance after the transaction (if shown)
- reference_number: Any reference/check number
- confidence: Your confidence in this row, between 0 and 1

IMPORTANT FORMATTING RULES:
1. Return ONLY valid JSON
2. Use null for missing information
3. Format dates as YYYY-MM-DD strings
4. Format amounts as numbers (use negative for debits/withdrawals)
5. Keep descriptions concise but complete

Response format:
{
  \"transactions\": [
    {
      \"transaction_date\": \"2024-01-15\",
      \"description\": \"WALMART SUPERCENTER\",
      \"amount\": -125.50,
      \"transaction_type\": \"debit\",
      \"balance\": 1875.32,
      \"reference_number\": \"4567\",
      \"confidence\": 0.95
    }
  ],
  \"confidence\": 0.95,
  \"total_found\": 1
}";

/// One keyword-to-category rule; rules are evaluated in order,
/// first match wins.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub keyword: String,
    pub category: String,
}

impl CategoryRule {
    fn new(keyword: &str, category: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            category: category.to_string(),
        }
    }
}

pub fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new("grocery", "groceries"),
        CategoryRule::new("supermarket", "groceries"),
        CategoryRule::new("walmart", "groceries"),
        CategoryRule::new("costco", "groceries"),
        CategoryRule::new("restaurant", "food"),
        CategoryRule::new("cafe", "food"),
        CategoryRule::new("coffee", "food"),
        CategoryRule::new("dining", "food"),
        CategoryRule::new("pizza", "food"),
        CategoryRule::new("gas", "fuel"),
        CategoryRule::new("fuel", "fuel"),
        CategoryRule::new("shell", "fuel"),
        CategoryRule::new("chevron", "fuel"),
        CategoryRule::new("amazon", "shopping"),
        CategoryRule::new("retail", "shopping"),
        CategoryRule::new("store", "shopping"),
        CategoryRule::new("netflix", "entertainment"),
        CategoryRule::new("spotify", "entertainment"),
        CategoryRule::new("cinema", "entertainment"),
        CategoryRule::new("pharmacy", "healthcare"),
        CategoryRule::new("medical", "healthcare"),
        CategoryRule::new("hospital", "healthcare"),
        CategoryRule::new("electric", "utilities"),
        CategoryRule::new("utility", "utilities"),
        CategoryRule::new("internet", "utilities"),
        CategoryRule::new("uber", "transport"),
        CategoryRule::new("lyft", "transport"),
        CategoryRule::new("taxi", "transport"),
        CategoryRule::new("parking", "transport"),
        CategoryRule::new("rent", "housing"),
        CategoryRule::new("mortgage", "housing"),
        CategoryRule::new("salary", "income"),
        CategoryRule::new("payroll", "income"),
        CategoryRule::new("atm", "cash"),
        CategoryRule::new("transfer", "transfer"),
        CategoryRule::new("interest", "interest"),
        CategoryRule::new("fee", "fees"),
        CategoryRule::new("charge", "fees"),
    ]
}

pub fn default_date_formats() -> Vec<String> {
    [
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%Y-%m-%d %H:%M:%S",
        "%d %b %Y",
        "%b %d, %Y",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

/// Outcome of one parsing run over one document's text.
///
/// Never an error: total failure is zero transactions with `error` set.
#[derive(Debug)]
pub struct ParseRun {
    pub transactions: Vec<Transaction>,
    pub error: Option<String>,
    pub raw_response: Option<String>,
}

impl ParseRun {
    fn failed(error: impl Into<String>, raw_response: Option<String>) -> Self {
        Self {
            transactions: Vec::new(),
            error: Some(error.into()),
            raw_response,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("no extracted text available")]
    NoTextAvailable,

    #[error("language model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("model response not interpretable: {0}")]
    Unparseable(String),
}

pub struct TransactionParser {
    provider: Arc<dyn CompletionProvider>,
    max_prompt_chars: usize,
    category_rules: Vec<CategoryRule>,
    date_formats: Vec<String>,
}

impl TransactionParser {
    pub fn new(provider: Arc<dyn CompletionProvider>, max_prompt_chars: usize) -> Self {
        Self {
            provider,
            max_prompt_chars,
            category_rules: default_category_rules(),
            date_formats: default_date_formats(),
        }
    }

    pub fn with_category_rules(mut self, rules: Vec<CategoryRule>) -> Self {
        self.category_rules = rules;
        self
    }

    pub fn with_date_formats(mut self, formats: Vec<String>) -> Self {
        self.date_formats = formats;
        self
    }

    /// Best available text for a document: vision first (it covers scanned
    /// documents), layout second.
    pub fn select_text(document: &Document) -> Option<(&str, ExtractionBackend)> {
        if let Some(text) = document.vision.as_ref().and_then(|s| s.usable_text()) {
            return Some((text, ExtractionBackend::Vision));
        }
        if let Some(text) = document.layout.as_ref().and_then(|s| s.usable_text()) {
            return Some((text, ExtractionBackend::Layout));
        }
        None
    }

    /// One model call over one document's consolidated text.
    pub async fn parse_statement_text(&self, statement_id: &str, text: &str) -> ParseRun {
        let prompt = self.build_user_prompt(text);

        let raw = match self.provider.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(statement_id = %statement_id, error = %e, "Language model call failed");
                return ParseRun::failed(ParseFailure::Provider(e).to_string(), None);
            }
        };

        tracing::debug!(
            statement_id = %statement_id,
            response_length = raw.len(),
            "Received language model response"
        );

        let Some(payload) = extract_payload(&raw) else {
            return ParseRun::failed(
                ParseFailure::Unparseable("no JSON payload found in response".to_string())
                    .to_string(),
                Some(raw),
            );
        };

        let Some(items) = transaction_items(&payload) else {
            return ParseRun::failed(
                ParseFailure::Unparseable("response carries no transaction list".to_string())
                    .to_string(),
                Some(raw),
            );
        };

        let model_confidence = payload.get("confidence").and_then(Value::as_f64);

        let transactions: Vec<Transaction> = items
            .iter()
            .map(|item| self.build_transaction(statement_id, item, model_confidence, &raw))
            .collect();

        tracing::info!(
            statement_id = %statement_id,
            count = transactions.len(),
            "Parsed transactions from model response"
        );

        ParseRun {
            transactions,
            error: None,
            raw_response: Some(raw),
        }
    }

    fn build_user_prompt(&self, text: &str) -> String {
        let mut statement_text: String = text.chars().take(self.max_prompt_chars).collect();
        if statement_text.len() < text.len() {
            statement_text.push_str("\n\n[TEXT TRUNCATED]");
        }

        format!(
            "Please extract all transaction details from the following financial \
             statement text:\n\n{}\n\nExtract each transaction with all available \
             details and return as JSON following the specified format.",
            statement_text
        )
    }

    fn build_transaction(
        &self,
        statement_id: &str,
        item: &Value,
        model_confidence: Option<f64>,
        raw_response: &str,
    ) -> Transaction {
        let confidence = item
            .get("confidence")
            .and_then(Value::as_f64)
            .or(model_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);

        let mut tx = Transaction::new(
            statement_id.to_string(),
            ExtractionSource::LanguageModel,
            confidence,
        );

        tx.description = clean_text(item.get("description"), MAX_DESCRIPTION_LEN);
        tx.reference_number = clean_text(item.get("reference_number"), MAX_REFERENCE_LEN);
        tx.transaction_type = normalize_type(item.get("transaction_type"));
        tx.balance = item.get("balance").and_then(parse_decimal);

        let amount = item.get("amount").and_then(parse_decimal);
        tx.amount = normalize_sign(amount, tx.transaction_type.as_deref());

        tx.transaction_date = self.parse_date(statement_id, item.get("transaction_date"));
        tx.category = Some(self.categorize(tx.description.as_deref()));
        tx.llm_raw_response = Some(raw_response.to_string());

        tx
    }

    fn parse_date(&self, statement_id: &str, value: Option<&Value>) -> Option<NaiveDate> {
        let raw = value?.as_str()?.trim();
        if raw.is_empty() {
            return None;
        }

        for format in &self.date_formats {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return Some(date);
            }
        }

        tracing::warn!(
            statement_id = %statement_id,
            date = %raw,
            "Unparseable transaction date, storing null"
        );
        None
    }

    fn categorize(&self, description: Option<&str>) -> String {
        let Some(description) = description else {
            return "other".to_string();
        };
        let haystack = description.to_lowercase();

        self.category_rules
            .iter()
            .find(|rule| haystack.contains(&rule.keyword))
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| "other".to_string())
    }
}

/// Locate the JSON payload inside a possibly prose-wrapped response.
fn extract_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // Code fences, with or without a language tag.
    if let Some(fenced) = strip_code_fence(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced.trim()) {
            return Some(value);
        }
    }

    // Carve the outermost object or array out of surrounding prose.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip a language tag such as "json" up to the first newline.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn transaction_items(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = payload.get("transactions").and_then(Value::as_array) {
        return Some(items);
    }
    payload.as_array()
}

fn clean_text(value: Option<&Value>, max_len: usize) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(max_len).collect())
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
                .collect();
            let cleaned = cleaned.trim();
            if let Some(inner) = cleaned
                .strip_prefix('(')
                .and_then(|rest| rest.strip_suffix(')'))
            {
                // Accounting notation: (123.45) is negative.
                return Decimal::from_str(inner).ok().map(|d| -d);
            }
            Decimal::from_str(cleaned).ok()
        }
        _ => None,
    }
}

const DEBIT_TYPES: &[&str] = &["debit", "withdrawal", "payment", "purchase", "fee"];
const CREDIT_TYPES: &[&str] = &["credit", "deposit", "refund", "interest"];

fn normalize_type(value: Option<&Value>) -> Option<String> {
    let raw = value?.as_str()?.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    Some(raw)
}

/// Force the amount sign to agree with the type label when the model's
/// sign disagrees.
fn normalize_sign(amount: Option<Decimal>, transaction_type: Option<&str>) -> Option<Decimal> {
    let amount = amount?;
    let Some(kind) = transaction_type else {
        return Some(amount);
    };

    if DEBIT_TYPES.contains(&kind) && amount > Decimal::ZERO {
        return Some(-amount);
    }
    if CREDIT_TYPES.contains(&kind) && amount < Decimal::ZERO {
        return Some(-amount);
    }
    Some(amount)
}
