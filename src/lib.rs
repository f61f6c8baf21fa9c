pub mod catalog;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod progress;
pub mod provision;
pub mod report;
pub mod verify;
pub mod warehouse;

pub use catalog::{Catalog, ColumnDef, ColumnType, PartitionSpec, TableDefinition};
pub use error::{LoaderError, Result};
pub use orchestrator::{CompletionPolicy, LoadOptions, Orchestrator};
pub use progress::{ProgressStore, SharedProgress, PROGRESS_FILE_NAME};
pub use report::{RunSummary, TableOutcome, TableReport};
pub use verify::{TableVerification, VerifyStatus};
pub use warehouse::{BigQueryWarehouse, LoadFormat, MemoryWarehouse, Warehouse, WriteMode};
