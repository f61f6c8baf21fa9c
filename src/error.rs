use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    /// Fatal before any warehouse interaction: bad input directory, zero
    /// matching files, unreadable catalog.
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Table-scoped: creation/existence check failed, the table's loads are
    /// skipped for this run.
    #[error("Provisioning failed for {table}: {reason}")]
    Provision { table: String, reason: String },

    /// File-scoped: the warehouse rejected one file, the run continues.
    #[error("Load failed for {table} ({}): {reason}", .file.display())]
    Load {
        table: String,
        file: PathBuf,
        reason: String,
    },

    /// File-scoped: the per-file ceiling expired before the load finished.
    #[error("Load timed out for {table} ({}) after {ceiling_secs}s", .file.display())]
    Timeout {
        table: String,
        file: PathBuf,
        ceiling_secs: u64,
    },

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Progress store error: {0}")]
    Progress(String),

    #[error("Progress store lock poisoned")]
    ProgressLock,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;
