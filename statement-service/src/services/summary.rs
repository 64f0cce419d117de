//! Statement-level financial summary, recomputed from persisted rows on
//! every call.

use crate::models::Transaction;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSummary {
    pub statement_id: String,
    pub total_transactions: usize,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub net_amount: Decimal,
    pub categories: BTreeMap<String, CategoryBreakdown>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryBreakdown {
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

/// Aggregate over the completed rows of a statement. Placeholder failure
/// rows (`processing_completed == false`) are excluded.
pub fn compute_summary(statement_id: &str, transactions: &[Transaction]) -> TransactionSummary {
    let completed: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.processing_completed)
        .collect();

    let mut total_credits = Decimal::ZERO;
    let mut total_debits = Decimal::ZERO;
    let mut categories: BTreeMap<String, CategoryBreakdown> = BTreeMap::new();
    let mut earliest: Option<NaiveDate> = None;
    let mut latest: Option<NaiveDate> = None;

    for transaction in &completed {
        if let Some(amount) = transaction.amount {
            if amount > Decimal::ZERO {
                total_credits += amount;
            } else if amount < Decimal::ZERO {
                total_debits += amount.abs();
            }
        }

        if let Some(category) = &transaction.category {
            let entry = categories
                .entry(category.clone())
                .or_insert(CategoryBreakdown {
                    count: 0,
                    amount: Decimal::ZERO,
                });
            entry.count += 1;
            if let Some(amount) = transaction.amount {
                entry.amount += amount;
            }
        }

        if let Some(date) = transaction.transaction_date {
            earliest = Some(earliest.map_or(date, |d| d.min(date)));
            latest = Some(latest.map_or(date, |d| d.max(date)));
        }
    }

    let date_range = match (earliest, latest) {
        (Some(earliest), Some(latest)) => Some(DateRange { earliest, latest }),
        _ => None,
    };

    TransactionSummary {
        statement_id: statement_id.to_string(),
        total_transactions: completed.len(),
        total_credits,
        total_debits,
        net_amount: total_credits - total_debits,
        categories,
        date_range,
    }
}
