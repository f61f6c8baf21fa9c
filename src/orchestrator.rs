//! Run orchestration
//!
//! Drives every table through provision, load, and completion. The one rule
//! that matters for correctness: a table gets at most one replace load, and
//! only as its first successful load while nothing of it has been loaded
//! yet. Everything after that appends, including every later run. Failed
//! files do not burn the replace; the next file that succeeds carries it.

use crate::catalog::Catalog;
use crate::discovery::{discover, FileGroup};
use crate::error::{LoaderError, Result};
use crate::executor::{Executor, DEFAULT_LOAD_CEILING};
use crate::progress::SharedProgress;
use crate::provision::{describe, Provisioner};
use crate::report::{FailureStage, LoadFailure, RunSummary, TableOutcome, TableReport};
use crate::warehouse::{LoadFormat, Warehouse, WriteMode};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// When a table with failed files may be marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Only mark complete when every file loaded; failures leave the table
    /// eligible for the next run.
    #[default]
    RequireClean,
    /// Mark complete even with failures. Matches `--complete-on-error`.
    AlwaysMark,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub dry_run: bool,
    pub skip_create: bool,
    /// Tables loaded concurrently. Files within a table are always serial.
    pub workers: usize,
    pub completion: CompletionPolicy,
    pub format: LoadFormat,
    pub load_ceiling: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            dry_run: false,
            skip_create: false,
            workers: 1,
            completion: CompletionPolicy::default(),
            format: LoadFormat::default(),
            load_ceiling: DEFAULT_LOAD_CEILING,
        }
    }
}

/// Replace/append decision for one table, held for the span of one run.
/// Starts at `ReplacePending` only when the progress store has seen none of
/// the table's files; flips permanently on the first successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteModeState {
    ReplacePending,
    AppendOnly,
}

impl WriteModeState {
    fn mode(self) -> WriteMode {
        match self {
            WriteModeState::ReplacePending => WriteMode::Replace,
            WriteModeState::AppendOnly => WriteMode::Append,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    warehouse: Arc<dyn Warehouse>,
    catalog: Catalog,
    options: LoadOptions,
}

impl Orchestrator {
    pub fn new(warehouse: Arc<dyn Warehouse>, catalog: Catalog, options: LoadOptions) -> Self {
        Orchestrator {
            warehouse,
            catalog,
            options,
        }
    }

    /// Load everything under `csv_dir`. Table order is catalog order; file
    /// order within a table is fixed by discovery.
    pub async fn run(&self, csv_dir: &Path, progress: SharedProgress) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let groups = discover(csv_dir, &self.catalog)?;
        if groups.is_empty() {
            return Err(LoaderError::Setup(format!(
                "no part files matching the catalog under {}",
                csv_dir.display()
            )));
        }
        info!(
            "run {} covering {} table(s), {} file(s){}",
            run_id,
            groups.len(),
            groups.values().map(FileGroup::len).sum::<usize>(),
            if self.options.dry_run { " [dry run]" } else { "" }
        );

        let tables = if self.options.workers > 1 && !self.options.dry_run {
            self.run_parallel(groups, progress).await?
        } else {
            let mut reports = Vec::with_capacity(groups.len());
            for (table, group) in &groups {
                reports.push(self.process_table(table, group, &progress).await?);
            }
            reports
        };

        Ok(RunSummary {
            run_id,
            started_at,
            elapsed: started.elapsed(),
            dry_run: self.options.dry_run,
            tables,
        })
    }

    /// One table, end to end. Returns `Err` only for faults that invalidate
    /// the whole run (progress store write failures); table-scoped trouble
    /// lands in the report instead.
    async fn process_table(
        &self,
        table: &str,
        group: &FileGroup,
        progress: &SharedProgress,
    ) -> Result<TableReport> {
        let def = self.catalog.get(table).ok_or_else(|| {
            LoaderError::Catalog(format!("table {} missing from catalog", table))
        })?;

        if progress.lock()?.is_completed(table) {
            debug!("{} already complete, skipping {} file(s)", table, group.len());
            let mut report = TableReport::already_complete(table);
            report.files_skipped = group.len();
            return Ok(report);
        }

        if self.options.dry_run {
            let pending = {
                let guard = progress.lock()?;
                group.files.iter().filter(|f| !guard.is_loaded(&f.path)).count()
            };
            let planned_provision = !self.options.skip_create;
            if planned_provision {
                info!("[dry run] would ensure {}", describe(def));
            }
            info!("[dry run] would load {} file(s) into {}", pending, table);
            return Ok(TableReport::planned(table, pending, planned_provision));
        }

        let started = Instant::now();

        let provisioner = Provisioner::new(self.warehouse.clone(), self.options.skip_create);
        if let Err(e) = provisioner.ensure(def).await {
            warn!("{}", e);
            let reason = match &e {
                LoaderError::Provision { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            let mut report = TableReport::provision_failed(
                table,
                LoadFailure {
                    table: table.to_string(),
                    stage: FailureStage::Provision,
                    message: reason,
                },
            );
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        let executor = Executor::new(
            self.warehouse.clone(),
            self.options.format.clone(),
            self.options.load_ceiling,
        );
        let mut report = TableReport::new(table);

        let already = progress.lock()?.loaded_count_for(group.paths());
        let mut state = if already == 0 {
            WriteModeState::ReplacePending
        } else {
            info!(
                "{}: {} of {} file(s) already loaded, appending the rest",
                table,
                already,
                group.len()
            );
            WriteModeState::AppendOnly
        };

        for file in &group.files {
            if progress.lock()?.is_loaded(&file.path) {
                debug!("skipping {} (already loaded)", file.file_name());
                report.files_skipped += 1;
                continue;
            }

            let attempt = executor.load(table, file, state.mode()).await;
            match attempt.error {
                None => {
                    progress.lock()?.mark_loaded(&file.path)?;
                    state = WriteModeState::AppendOnly;
                    report.files_loaded += 1;
                }
                Some(e) => {
                    // The replace, if still pending, stays pending for the
                    // next file in order.
                    report.files_failed += 1;
                    report.errors.push(LoadFailure {
                        table: table.to_string(),
                        stage: FailureStage::File(file.path.clone()),
                        message: failure_message(&e),
                    });
                }
            }
        }

        let clean = report.files_failed == 0;
        if clean || self.options.completion == CompletionPolicy::AlwaysMark {
            progress.lock()?.mark_completed(table)?;
            report.outcome = if clean {
                TableOutcome::Completed
            } else {
                warn!(
                    "marking {} complete despite {} failed file(s)",
                    table, report.files_failed
                );
                TableOutcome::CompletedWithFailures
            };
        } else {
            warn!(
                "{} left incomplete, {} of {} file(s) failed",
                table,
                report.files_failed,
                group.len()
            );
            report.outcome = TableOutcome::LeftIncomplete;
        }
        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Table-level fan-out. Reports come back in the same table order the
    /// sequential path produces, whatever order the workers finish in.
    async fn run_parallel(
        &self,
        groups: BTreeMap<String, FileGroup>,
        progress: SharedProgress,
    ) -> Result<Vec<TableReport>> {
        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut handles = Vec::with_capacity(groups.len());
        for (table, group) in groups {
            let orchestrator = self.clone();
            let progress = progress.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| LoaderError::Setup(format!("worker pool closed: {}", e)))?;
                orchestrator.process_table(&table, &group, &progress).await
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            let report = handle
                .await
                .map_err(|e| LoaderError::Setup(format!("table worker panicked: {}", e)))??;
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Message stored in failure records. Timeouts and load rejections come
/// pre-scoped to table and file, so only the cause is kept.
fn failure_message(e: &LoaderError) -> String {
    match e {
        LoaderError::Timeout { ceiling_secs, .. } => format!("timed out after {}s", ceiling_secs),
        LoaderError::Load { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_write_mode_state_maps_to_modes() {
        assert_eq!(WriteModeState::ReplacePending.mode(), WriteMode::Replace);
        assert_eq!(WriteModeState::AppendOnly.mode(), WriteMode::Append);
    }

    #[test]
    fn test_failure_message_keeps_cause_only() {
        let timeout = LoaderError::Timeout {
            table: "tls801_country".to_string(),
            file: PathBuf::from("tls801_country_part01.csv"),
            ceiling_secs: 14_400,
        };
        assert_eq!(failure_message(&timeout), "timed out after 14400s");

        let load = LoaderError::Load {
            table: "tls801_country".to_string(),
            file: PathBuf::from("tls801_country_part01.csv"),
            reason: "bad row".to_string(),
        };
        assert_eq!(failure_message(&load), "bad row");
    }
}
