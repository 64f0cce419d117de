pub mod database;
pub mod llm;
pub mod metrics;
pub mod storage;
pub mod summary;

pub use database::{MemoryStore, MongoStore, RecordStore};
pub use self::metrics::{get_metrics, init_metrics};
pub use storage::{LocalStorage, Storage};
