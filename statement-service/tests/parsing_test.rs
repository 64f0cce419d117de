mod common;

use common::*;
use rust_decimal::Decimal;
use statement_service::models::{DocumentStatus, ExtractionSource};
use statement_service::services::database::{MemoryStore, RecordStore};
use statement_service::services::llm::{MockProvider, ProviderError};
use std::sync::Arc;

fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

#[tokio::test]
async fn parsing_persists_normalized_rows_and_finishes_the_document() {
    let store = Arc::new(MemoryStore::new());
    let document = seed_extracted_document(
        &store,
        "user-1",
        "stmt-1",
        Some("statement body"),
        None,
    )
    .await;

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(model_response_a())),
    );

    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 2);
    assert!(transactions.iter().all(|t| t.processing_completed));
    assert!(transactions
        .iter()
        .all(|t| t.extraction_source == ExtractionSource::LanguageModel));
    assert!(transactions.iter().all(|t| t.llm_raw_response.is_some()));

    let document = store.find_document(&document.id).await.unwrap().unwrap();
    assert_eq!(document.status, DocumentStatus::Done);
}

#[tokio::test]
async fn rerun_replaces_prior_rows_wholesale() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("statement body"), None).await;

    let worker_a = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(model_response_a())),
    );
    worker_a.run_parsing("stmt-1").await;
    assert_eq!(store.list_transactions("stmt-1").await.unwrap().len(), 2);

    let worker_b = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(model_response_b())),
    );
    worker_b.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 3);
    // No residue from run A.
    assert!(transactions
        .iter()
        .all(|t| !t.description.as_deref().unwrap_or_default().contains("WALMART")));
}

#[tokio::test]
async fn amount_signs_follow_type_labels() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("statement body"), None).await;

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(model_response_a())),
    );
    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert!(transactions.iter().all(|t| t.sign_consistent()));

    let debit = transactions
        .iter()
        .find(|t| t.transaction_type.as_deref() == Some("debit"))
        .unwrap();
    // The model reported +125.50 for a debit; the sign is forced negative.
    assert_eq!(debit.amount, Some(dec("-125.50")));

    let deposit = transactions
        .iter()
        .find(|t| t.transaction_type.as_deref() == Some("deposit"))
        .unwrap();
    assert_eq!(deposit.amount, Some(dec("1500.00")));
}

#[tokio::test]
async fn fenced_response_parses_like_the_bare_payload() {
    let bare_store = Arc::new(MemoryStore::new());
    seed_extracted_document(&bare_store, "user-1", "stmt-1", Some("text"), None).await;
    build_worker(
        bare_store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(model_response_a())),
    )
    .run_parsing("stmt-1")
    .await;

    let fenced = format!(
        "Sure! Here is the structured data you asked for:\n\n```json\n{}\n```\n\nAnything else?",
        model_response_a()
    );
    let fenced_store = Arc::new(MemoryStore::new());
    seed_extracted_document(&fenced_store, "user-1", "stmt-1", Some("text"), None).await;
    build_worker(
        fenced_store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(fenced)),
    )
    .run_parsing("stmt-1")
    .await;

    let bare_rows = bare_store.list_transactions("stmt-1").await.unwrap();
    let fenced_rows = fenced_store.list_transactions("stmt-1").await.unwrap();

    assert_eq!(bare_rows.len(), fenced_rows.len());
    for (a, b) in bare_rows.iter().zip(fenced_rows.iter()) {
        assert_eq!(a.description, b.description);
        assert_eq!(a.amount, b.amount);
        assert_eq!(a.transaction_date, b.transaction_date);
    }
}

#[tokio::test]
async fn uninterpretable_response_leaves_a_visible_failure_row() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("text"), None).await;

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(
            "I'm sorry, I could not find any transactions in this document.",
        )),
    );
    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 1);
    let row = &transactions[0];
    assert!(!row.processing_completed);
    assert!(row.processing_error.is_some());
    assert!(row.llm_raw_response.is_some());
}

#[tokio::test]
async fn provider_failure_is_recorded_not_raised() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("text"), None).await;

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::failing(ProviderError::RateLimited)),
    );
    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert!(transactions[0]
        .processing_error
        .as_deref()
        .unwrap()
        .contains("Rate limited"));
}

#[tokio::test]
async fn statement_without_usable_text_fails_with_no_text_available() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", None, None).await;

    let provider = Arc::new(MockProvider::with_reply(model_response_a()));
    let worker = build_worker(store.clone(), MemStorage::empty(), vec![], provider.clone());
    worker.run_parsing("stmt-1").await;

    // The model was never called.
    assert!(provider.recorded_prompts().is_empty());

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert!(transactions[0]
        .processing_error
        .as_deref()
        .unwrap()
        .contains("no extracted text available"));
}

#[tokio::test]
async fn vision_text_preferred_over_layout_text() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(
        &store,
        "user-1",
        "stmt-1",
        Some("LAYOUT-ONLY-MARKER"),
        Some("VISION-ONLY-MARKER"),
    )
    .await;

    let provider = Arc::new(MockProvider::with_reply(model_response_a()));
    let worker = build_worker(store.clone(), MemStorage::empty(), vec![], provider.clone());
    worker.run_parsing("stmt-1").await;

    let prompts = provider.recorded_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("VISION-ONLY-MARKER"));
    assert!(!prompts[0].contains("LAYOUT-ONLY-MARKER"));
}

#[tokio::test]
async fn confidence_defaults_to_baseline_when_model_reports_none() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("text"), None).await;

    let reply = serde_json::json!({
        "transactions": [
            { "description": "NO CONFIDENCE ANYWHERE", "amount": -5.00, "transaction_type": "debit" }
        ]
    })
    .to_string();

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(reply)),
    );
    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert!((transactions[0].confidence_score - 0.7).abs() < f64::EPSILON);
}

#[tokio::test]
async fn unparseable_date_keeps_the_row_with_null_date() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("text"), None).await;

    let reply = serde_json::json!({
        "transactions": [
            { "transaction_date": "sometime last week", "description": "COFFEE SHOP", "amount": -4.50, "transaction_type": "debit" }
        ],
        "confidence": 0.8
    })
    .to_string();

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(reply)),
    );
    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert!(transactions[0].transaction_date.is_none());
    assert_eq!(transactions[0].category.as_deref(), Some("food"));
}

#[tokio::test]
async fn categories_derived_from_description_keywords() {
    let store = Arc::new(MemoryStore::new());
    seed_extracted_document(&store, "user-1", "stmt-1", Some("text"), None).await;

    let worker = build_worker(
        store.clone(),
        MemStorage::empty(),
        vec![],
        Arc::new(MockProvider::with_reply(model_response_b())),
    );
    worker.run_parsing("stmt-1").await;

    let transactions = store.list_transactions("stmt-1").await.unwrap();
    let category_of = |needle: &str| {
        transactions
            .iter()
            .find(|t| t.description.as_deref().unwrap_or_default().contains(needle))
            .and_then(|t| t.category.clone())
            .unwrap()
    };
    assert_eq!(category_of("SHELL"), "fuel");
    assert_eq!(category_of("NETFLIX"), "entertainment");
    assert_eq!(category_of("REFUND"), "other");
}
