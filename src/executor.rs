//! Single-file load execution
//!
//! Wraps one warehouse load in the per-file time ceiling and normalizes
//! failures into table-and-file scoped errors with a bounded message, so a
//! multi-megabyte stderr dump from the warehouse cannot flood the summary.

use crate::discovery::PartFile;
use crate::error::LoaderError;
use crate::warehouse::{LoadFormat, Warehouse, WriteMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Ceiling applied to a single file load. PATSTAT parts are a few GB at
/// most; anything past this is a hung job, not a slow one.
pub const DEFAULT_LOAD_CEILING: Duration = Duration::from_secs(4 * 60 * 60);

/// Characters of warehouse error output kept in failure records.
pub const ERROR_MESSAGE_CEILING: usize = 200;

/// Outcome of one attempted file load.
#[derive(Debug)]
pub struct LoadAttempt {
    pub elapsed: Duration,
    pub error: Option<LoaderError>,
}

impl LoadAttempt {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Executor {
    warehouse: Arc<dyn Warehouse>,
    format: LoadFormat,
    ceiling: Duration,
}

impl Executor {
    pub fn new(warehouse: Arc<dyn Warehouse>, format: LoadFormat, ceiling: Duration) -> Self {
        Executor {
            warehouse,
            format,
            ceiling,
        }
    }

    pub async fn load(&self, table: &str, file: &PartFile, mode: WriteMode) -> LoadAttempt {
        let started = Instant::now();
        info!(
            "loading {} into {} ({}, {} bytes)",
            file.file_name(),
            table,
            mode,
            file.bytes
        );

        let load = self
            .warehouse
            .load_file(table, &file.path, mode, &self.format);
        let error = match tokio::time::timeout(self.ceiling, load).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(LoaderError::Load {
                table: table.to_string(),
                file: file.path.clone(),
                reason: truncate_message(&e.to_string(), ERROR_MESSAGE_CEILING),
            }),
            Err(_) => Some(LoaderError::Timeout {
                table: table.to_string(),
                file: file.path.clone(),
                ceiling_secs: self.ceiling.as_secs(),
            }),
        };

        let elapsed = started.elapsed();
        match &error {
            None => info!(
                "loaded {} into {} in {:.1}s",
                file.file_name(),
                table,
                elapsed.as_secs_f64()
            ),
            Some(e) => warn!("{}", e),
        }
        LoadAttempt { elapsed, error }
    }
}

/// Keep at most `limit` characters, marking the cut. Splits on character
/// boundaries so multi-byte output from the warehouse cannot panic us.
pub fn truncate_message(msg: &str, limit: usize) -> String {
    match msg.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &msg[..idx]),
        None => msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TableDefinition};
    use crate::error::Result;
    use crate::warehouse::MemoryWarehouse;
    use async_trait::async_trait;
    use std::fs;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 200), "short");
        let long = "x".repeat(500);
        let cut = truncate_message(&long, 200);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.ends_with("..."));

        let accented = "é".repeat(300);
        let cut = truncate_message(&accented, 200);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 203);
    }

    fn temp_part(name: &str, content: &str) -> PartFile {
        let dir = std::env::temp_dir().join(format!("patload_exec_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        let bytes = fs::metadata(&path).unwrap().len();
        PartFile { path, bytes }
    }

    #[tokio::test]
    async fn test_load_reports_success_and_failure() -> Result<()> {
        let wh = Arc::new(MemoryWarehouse::new());
        let def = Catalog::patstat().get("tls904_nuts").unwrap().clone();
        wh.create_table(&def).await?;
        let executor = Executor::new(wh.clone(), LoadFormat::default(), DEFAULT_LOAD_CEILING);

        let part = temp_part("tls904_nuts_part01.csv", "nuts,nuts_level,nuts_label\nDE1,1,x\n");
        let attempt = executor.load("tls904_nuts", &part, WriteMode::Replace).await;
        assert!(attempt.is_ok());
        assert_eq!(wh.rows("tls904_nuts"), Some(1));

        wh.fail_load("tls904_nuts", "tls904_nuts_part01.csv");
        let attempt = executor.load("tls904_nuts", &part, WriteMode::Append).await;
        match attempt.error {
            Some(LoaderError::Load { table, reason, .. }) => {
                assert_eq!(table, "tls904_nuts");
                assert!(reason.contains("refused by test setup"));
            }
            other => panic!("expected Load error, got {other:?}"),
        }
        Ok(())
    }

    struct StalledWarehouse;

    #[async_trait]
    impl crate::warehouse::Warehouse for StalledWarehouse {
        async fn table_exists(&self, _table: &str) -> Result<bool> {
            Ok(true)
        }
        async fn create_table(&self, _def: &TableDefinition) -> Result<()> {
            Ok(())
        }
        async fn load_file(
            &self,
            _table: &str,
            _path: &Path,
            _mode: WriteMode,
            _format: &LoadFormat,
        ) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        async fn row_count(&self, _table: &str) -> Result<Option<u64>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_load_times_out_at_ceiling() {
        let executor = Executor::new(
            Arc::new(StalledWarehouse),
            LoadFormat::default(),
            Duration::from_millis(10),
        );
        let part = temp_part("tls904_nuts_part01.csv", "nuts,nuts_level,nuts_label\n");

        let attempt = executor.load("tls904_nuts", &part, WriteMode::Replace).await;
        match attempt.error {
            Some(LoaderError::Timeout { ceiling_secs, .. }) => assert_eq!(ceiling_secs, 0),
            other => panic!("expected Timeout error, got {other:?}"),
        }
    }
}
