//! Warehouse abstraction
//!
//! The orchestrator only ever talks to this trait: existence probe, table
//! creation, one-file load, row count. `BigQueryWarehouse` is the production
//! implementation; `MemoryWarehouse` backs the tests.

pub mod bigquery;
pub mod memory;

pub use bigquery::BigQueryWarehouse;
pub use memory::MemoryWarehouse;

use crate::catalog::TableDefinition;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Whether a load replaces the table contents or appends to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Replace,
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Replace => write!(f, "replace"),
            WriteMode::Append => write!(f, "append"),
        }
    }
}

/// CSV-shape options applied to every load in a run.
#[derive(Debug, Clone)]
pub struct LoadFormat {
    /// Header rows to drop from each file.
    pub skip_leading_rows: u32,
    /// PATSTAT text columns (titles, abstracts) embed newlines inside quotes.
    pub allow_quoted_newlines: bool,
    /// Rows the warehouse may reject before the whole load fails.
    pub max_bad_records: u32,
}

impl Default for LoadFormat {
    fn default() -> Self {
        LoadFormat {
            skip_leading_rows: 1,
            allow_quoted_newlines: true,
            max_bad_records: 100,
        }
    }
}

/// Minimal capability surface the loader needs from a destination warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn create_table(&self, def: &TableDefinition) -> Result<()>;

    /// Load one local CSV file into `table`. Errors are table-and-file
    /// scoped; the caller decides whether the run continues.
    async fn load_file(
        &self,
        table: &str,
        path: &Path,
        mode: WriteMode,
        format: &LoadFormat,
    ) -> Result<()>;

    /// Current row count, or `None` if the table does not exist.
    async fn row_count(&self, table: &str) -> Result<Option<u64>>;
}
