pub mod documents;
pub mod transactions;

pub use documents::{
    BackendText, DocumentListParams, DocumentResponse, DocumentTextResponse, ExtractionComparison,
    UploadRequest,
};
pub use transactions::{
    DeleteTransactionsResponse, TransactionExtractionResponse, TransactionResponse,
};
