pub mod documents;
pub mod health;
pub mod transactions;

pub use documents::{
    delete_document, get_document, get_document_text, list_documents, trigger_text_extraction,
    upload_document,
};
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use transactions::{
    delete_statement_transactions, get_transaction_summary, list_statement_transactions,
    trigger_transaction_extraction,
};
