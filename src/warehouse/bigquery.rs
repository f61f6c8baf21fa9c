//! BigQuery warehouse backed by the `bq` command-line tool
//!
//! Every operation shells out to `bq`, the same tool operators already use
//! by hand, so authentication and project wiring come from the ambient
//! gcloud config. Argument construction is split into pure helpers so the
//! command shape stays testable without a live project.

use crate::catalog::{PartitionSpec, TableDefinition};
use crate::error::{LoaderError, Result};
use crate::warehouse::{LoadFormat, Warehouse, WriteMode};
use async_trait::async_trait;
use itertools::Itertools;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    project: String,
    dataset: String,
    bq_path: String,
}

impl BigQueryWarehouse {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        BigQueryWarehouse {
            project: project.into(),
            dataset: dataset.into(),
            bq_path: "bq".to_string(),
        }
    }

    /// Override the `bq` binary location, for hosts where it is not on PATH.
    pub fn with_bq_path(mut self, path: impl Into<String>) -> Self {
        self.bq_path = path.into();
        self
    }

    /// `project:dataset.table`, the form the bq tool expects.
    fn qualified(&self, table: &str) -> String {
        format!("{}:{}.{}", self.project, self.dataset, table)
    }

    fn create_args(&self, def: &TableDefinition) -> Vec<String> {
        let mut args = vec!["mk".to_string(), "--table".to_string()];
        match &def.partition {
            Some(PartitionSpec::IntegerRange {
                column,
                start,
                end,
                interval,
            }) => {
                args.push(format!(
                    "--range_partitioning={},{},{},{}",
                    column, start, end, interval
                ));
            }
            Some(PartitionSpec::Time { column, granularity }) => {
                args.push(format!("--time_partitioning_field={}", column));
                args.push(format!("--time_partitioning_type={}", granularity));
            }
            None => {}
        }
        if !def.clustering.is_empty() {
            args.push(format!(
                "--clustering_fields={}",
                def.clustering.iter().join(",")
            ));
        }
        args.push(self.qualified(&def.name));
        args.push(def.schema_string());
        args
    }

    fn load_args(
        &self,
        table: &str,
        path: &Path,
        mode: WriteMode,
        format: &LoadFormat,
    ) -> Vec<String> {
        let mut args = vec![
            "load".to_string(),
            "--source_format=CSV".to_string(),
            format!("--skip_leading_rows={}", format.skip_leading_rows),
            format!("--max_bad_records={}", format.max_bad_records),
        ];
        if format.allow_quoted_newlines {
            args.push("--allow_quoted_newlines".to_string());
        }
        args.push(match mode {
            WriteMode::Replace => "--replace".to_string(),
            WriteMode::Append => "--noreplace".to_string(),
        });
        args.push(self.qualified(table));
        args.push(path.to_string_lossy().into_owned());
        args
    }

    fn count_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM `{}.{}.{}`",
            self.project, self.dataset, table
        )
    }

    async fn run_bq(&self, args: &[String]) -> Result<Output> {
        debug!("bq {}", args.iter().join(" "));
        Command::new(&self.bq_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LoaderError::Warehouse(format!("failed to run {}: {}", self.bq_path, e))
            })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let args = vec![
            "show".to_string(),
            "--format=none".to_string(),
            self.qualified(table),
        ];
        let output = self.run_bq(&args).await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = stderr_text(&output);
        if is_not_found(&stderr) {
            Ok(false)
        } else {
            Err(LoaderError::Warehouse(format!(
                "bq show {} failed: {}",
                table, stderr
            )))
        }
    }

    async fn create_table(&self, def: &TableDefinition) -> Result<()> {
        let output = self.run_bq(&self.create_args(def)).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LoaderError::Warehouse(stderr_text(&output)))
        }
    }

    async fn load_file(
        &self,
        table: &str,
        path: &Path,
        mode: WriteMode,
        format: &LoadFormat,
    ) -> Result<()> {
        let args = self.load_args(table, path, mode, format);
        let output = self.run_bq(&args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LoaderError::Warehouse(stderr_text(&output)))
        }
    }

    async fn row_count(&self, table: &str) -> Result<Option<u64>> {
        let args = vec![
            "query".to_string(),
            "--quiet".to_string(),
            "--use_legacy_sql=false".to_string(),
            "--format=csv".to_string(),
            self.count_sql(table),
        ];
        let output = self.run_bq(&args).await?;
        if !output.status.success() {
            let stderr = stderr_text(&output);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(LoaderError::Warehouse(format!(
                "bq query for {} failed: {}",
                table, stderr
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        parse_count_output(&stdout).ok_or_else(|| {
            LoaderError::Warehouse(format!("unexpected COUNT output for {}: {:?}", table, stdout))
        })
        .map(Some)
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("Not found")
}

/// The csv output is a header line followed by the count; status chatter may
/// precede it, so take the last non-empty line.
fn parse_count_output(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .and_then(|l| l.parse::<u64>().ok())
}
