//! In-memory warehouse used by the test suite
//!
//! Counts rows by actually parsing the CSV files it is handed, enforces the
//! same bad-record ceiling the real warehouse does, and records every call
//! so tests can assert on interaction order (in particular, how many replace
//! loads a table ever saw).

use crate::catalog::TableDefinition;
use crate::error::{LoaderError, Result};
use crate::warehouse::{LoadFormat, Warehouse, WriteMode};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct TableState {
    columns: usize,
    rows: u64,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, TableState>,
    calls: Vec<String>,
    fail_loads: HashSet<(String, String)>,
    fail_creates: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    inner: Mutex<Inner>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        MemoryWarehouse::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| LoaderError::Warehouse("memory warehouse lock poisoned".to_string()))
    }

    /// Every trait call in arrival order, e.g. `load replace tls801_country
    /// tls801_country_part01.csv`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().map(|inner| inner.calls.clone()).unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> Option<u64> {
        self.lock()
            .ok()
            .and_then(|inner| inner.tables.get(table).map(|t| t.rows))
    }

    /// Force a table into existence with a fixed row count.
    pub fn set_rows(&self, table: &str, rows: u64) {
        if let Ok(mut inner) = self.lock() {
            inner
                .tables
                .entry(table.to_string())
                .or_default()
                .rows = rows;
        }
    }

    /// Make loads of `file_name` into `table` fail until cleared.
    pub fn fail_load(&self, table: &str, file_name: &str) {
        if let Ok(mut inner) = self.lock() {
            inner
                .fail_loads
                .insert((table.to_string(), file_name.to_string()));
        }
    }

    pub fn clear_load_failures(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_loads.clear();
        }
    }

    pub fn fail_create(&self, table: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.fail_creates.insert(table.to_string());
        }
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.calls.push(format!("exists {}", table));
        Ok(inner.tables.contains_key(table))
    }

    async fn create_table(&self, def: &TableDefinition) -> Result<()> {
        let mut inner = self.lock()?;
        inner.calls.push(format!("create {}", def.name));
        if inner.fail_creates.contains(&def.name) {
            return Err(LoaderError::Warehouse(format!(
                "create {} refused by test setup",
                def.name
            )));
        }
        inner.tables.insert(
            def.name.clone(),
            TableState {
                columns: def.column_count(),
                rows: 0,
            },
        );
        Ok(())
    }

    async fn load_file(
        &self,
        table: &str,
        path: &Path,
        mode: WriteMode,
        format: &LoadFormat,
    ) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        {
            let mut inner = self.lock()?;
            inner.calls.push(format!("load {} {} {}", mode, table, file_name));
            if !inner.tables.contains_key(table) {
                return Err(LoaderError::Warehouse(format!("table {} not found", table)));
            }
            if inner
                .fail_loads
                .contains(&(table.to_string(), file_name.clone()))
            {
                return Err(LoaderError::Warehouse(format!(
                    "load of {} refused by test setup",
                    file_name
                )));
            }
        }

        let expected_columns = self
            .lock()?
            .tables
            .get(table)
            .map(|t| t.columns)
            .unwrap_or(0);
        let (rows, bad) = count_csv_rows(path, format, expected_columns)?;
        if bad > format.max_bad_records as u64 {
            return Err(LoaderError::Warehouse(format!(
                "too many bad records in {}: {} > {}",
                file_name, bad, format.max_bad_records
            )));
        }

        let mut inner = self.lock()?;
        let state = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| LoaderError::Warehouse(format!("table {} not found", table)))?;
        match mode {
            WriteMode::Replace => state.rows = rows,
            WriteMode::Append => state.rows += rows,
        }
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<Option<u64>> {
        let mut inner = self.lock()?;
        inner.calls.push(format!("count {}", table));
        Ok(inner.tables.get(table).map(|t| t.rows))
    }
}

/// Parse the CSV and return `(good, bad)` row counts. A row is bad when it
/// fails to parse or its width disagrees with the table schema.
fn count_csv_rows(path: &Path, format: &LoadFormat, expected_columns: usize) -> Result<(u64, u64)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(format.skip_leading_rows > 0)
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            LoaderError::Warehouse(format!("failed to read {}: {}", path.display(), e))
        })?;

    let mut rows = 0u64;
    let mut bad = 0u64;
    for record in reader.records() {
        match record {
            Ok(rec) if expected_columns > 0 && rec.len() != expected_columns => bad += 1,
            Ok(_) => rows += 1,
            Err(_) => bad += 1,
        }
    }
    Ok((rows, bad))
}
