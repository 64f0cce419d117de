mod executor;
mod extractor;
mod layout;
mod orchestrator;
mod parser;
mod vision;

pub use executor::{CommandError, CommandExecutor};
pub use extractor::{attempt, ExtractError, ExtractionBackend, RawExtraction, TextExtractor};
pub use layout::LayoutExtractor;
pub use orchestrator::{PipelineJob, PipelineOrchestrator, PipelineWorker};
pub use parser::{
    default_category_rules, default_date_formats, CategoryRule, ParseRun, TransactionParser,
};
pub use vision::VisionExtractor;
