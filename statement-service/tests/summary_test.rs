mod common;

use common::*;
use rust_decimal::Decimal;
use statement_service::models::{ExtractionSource, Transaction};
use statement_service::services::database::{MemoryStore, RecordStore};
use statement_service::services::summary::compute_summary;
use std::sync::Arc;

fn tx(statement_id: &str, amount: &str, category: &str, date: Option<&str>) -> Transaction {
    let mut tx = Transaction::new(
        statement_id.to_string(),
        ExtractionSource::LanguageModel,
        0.9,
    );
    tx.amount = Some(amount.parse().unwrap());
    tx.category = Some(category.to_string());
    tx.transaction_date = date.map(|d| d.parse().unwrap());
    tx.transaction_type = Some(if amount.starts_with('-') {
        "debit".to_string()
    } else {
        "credit".to_string()
    });
    tx
}

#[tokio::test]
async fn summary_reflects_persisted_rows_exactly() {
    let store = Arc::new(MemoryStore::new());
    store
        .replace_transactions(
            "stmt-1",
            vec![
                tx("stmt-1", "2500.00", "income", Some("2024-03-01")),
                tx("stmt-1", "-1200.00", "housing", Some("2024-03-03")),
                tx("stmt-1", "-45.67", "food", Some("2024-03-10")),
                tx("stmt-1", "-45.67", "food", Some("2024-03-21")),
            ],
        )
        .await
        .unwrap();

    let rows = store.list_transactions("stmt-1").await.unwrap();
    let summary = compute_summary("stmt-1", &rows);

    assert_eq!(summary.total_transactions, 4);
    assert_eq!(summary.total_credits, "2500.00".parse::<Decimal>().unwrap());
    assert_eq!(summary.total_debits, "1291.34".parse::<Decimal>().unwrap());
    assert_eq!(
        summary.net_amount,
        summary.total_credits - summary.total_debits
    );

    let food = &summary.categories["food"];
    assert_eq!(food.count, 2);
    assert_eq!(food.amount, "-91.34".parse::<Decimal>().unwrap());

    let range = summary.date_range.as_ref().unwrap();
    assert_eq!(range.earliest.to_string(), "2024-03-01");
    assert_eq!(range.latest.to_string(), "2024-03-21");
}

#[tokio::test]
async fn summary_is_idempotent_across_calls() {
    let store = Arc::new(MemoryStore::new());
    store
        .replace_transactions(
            "stmt-1",
            vec![
                tx("stmt-1", "100.00", "income", Some("2024-01-01")),
                tx("stmt-1", "-30.00", "food", None),
            ],
        )
        .await
        .unwrap();

    let rows = store.list_transactions("stmt-1").await.unwrap();
    let first = compute_summary("stmt-1", &rows);
    let second = compute_summary("stmt-1", &rows);
    assert_eq!(first, second);
}

#[tokio::test]
async fn deleting_all_transactions_empties_the_summary() {
    let store = Arc::new(MemoryStore::new());
    store
        .replace_transactions(
            "stmt-1",
            vec![
                tx("stmt-1", "100.00", "income", Some("2024-01-01")),
                tx("stmt-1", "-30.00", "food", Some("2024-01-02")),
            ],
        )
        .await
        .unwrap();

    let deleted = store.delete_transactions("stmt-1").await.unwrap();
    assert_eq!(deleted, 2);

    let rows = store.list_transactions("stmt-1").await.unwrap();
    let summary = compute_summary("stmt-1", &rows);
    assert_eq!(summary.total_transactions, 0);
    assert_eq!(summary.net_amount, Decimal::ZERO);
    assert!(summary.categories.is_empty());
    assert!(summary.date_range.is_none());
}

#[tokio::test]
async fn replace_is_atomic_per_statement_and_scoped_to_it() {
    let store = Arc::new(MemoryStore::new());
    store
        .replace_transactions("stmt-1", vec![tx("stmt-1", "-1.00", "fees", None)])
        .await
        .unwrap();
    store
        .replace_transactions("stmt-2", vec![tx("stmt-2", "-2.00", "fees", None)])
        .await
        .unwrap();

    // Replacing stmt-1 leaves stmt-2 untouched.
    store
        .replace_transactions(
            "stmt-1",
            vec![
                tx("stmt-1", "-3.00", "fees", None),
                tx("stmt-1", "-4.00", "fees", None),
            ],
        )
        .await
        .unwrap();

    assert_eq!(store.list_transactions("stmt-1").await.unwrap().len(), 2);
    let other = store.list_transactions("stmt-2").await.unwrap();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].amount, Some("-2.00".parse().unwrap()));
}
