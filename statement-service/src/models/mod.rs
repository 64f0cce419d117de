pub mod document;
pub mod transaction;

pub use document::{Document, DocumentStatus, ExtractionState};
pub use transaction::{ExtractionSource, Transaction};
