//! Run reporting
//!
//! Structured results for one orchestrator run: what each table did, which
//! files failed and why, and a rendered summary block for the console. The
//! report is data first so tests assert on fields, not on formatting.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Where in a table's pipeline a failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureStage {
    Provision,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub table: String,
    pub stage: FailureStage,
    pub message: String,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            FailureStage::Provision => {
                write!(f, "{}: provisioning failed: {}", self.table, self.message)
            }
            FailureStage::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                write!(f, "{} ({}): {}", self.table, name, self.message)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    /// Marked complete by an earlier run; nothing to do.
    AlreadyComplete,
    Completed,
    /// Marked complete despite failures (`--complete-on-error`).
    CompletedWithFailures,
    /// Files failed and the table stays eligible for the next run.
    LeftIncomplete,
    ProvisionFailed,
    /// Dry run only.
    Planned,
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TableOutcome::AlreadyComplete => "complete (prior run)",
            TableOutcome::Completed => "completed",
            TableOutcome::CompletedWithFailures => "completed with failures",
            TableOutcome::LeftIncomplete => "incomplete",
            TableOutcome::ProvisionFailed => "provisioning failed",
            TableOutcome::Planned => "planned",
        };
        write!(f, "{}", label)
    }
}

/// Everything one table did during a run.
#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub planned_loads: usize,
    pub planned_provision: bool,
    pub elapsed: Duration,
    pub errors: Vec<LoadFailure>,
}

impl TableReport {
    pub fn new(table: impl Into<String>) -> Self {
        TableReport {
            table: table.into(),
            outcome: TableOutcome::LeftIncomplete,
            files_loaded: 0,
            files_skipped: 0,
            files_failed: 0,
            planned_loads: 0,
            planned_provision: false,
            elapsed: Duration::ZERO,
            errors: Vec::new(),
        }
    }

    pub fn already_complete(table: impl Into<String>) -> Self {
        let mut report = TableReport::new(table);
        report.outcome = TableOutcome::AlreadyComplete;
        report
    }

    pub fn planned(table: impl Into<String>, planned_loads: usize, planned_provision: bool) -> Self {
        let mut report = TableReport::new(table);
        report.outcome = TableOutcome::Planned;
        report.planned_loads = planned_loads;
        report.planned_provision = planned_provision;
        report
    }

    pub fn provision_failed(table: impl Into<String>, failure: LoadFailure) -> Self {
        let mut report = TableReport::new(table);
        report.outcome = TableOutcome::ProvisionFailed;
        report.errors.push(failure);
        report
    }

    fn detail(&self) -> String {
        if self.outcome == TableOutcome::Planned {
            let mut detail = format!("{} load(s) planned", self.planned_loads);
            if self.planned_provision {
                detail.push_str(", would create table");
            }
            return detail;
        }
        format!(
            "{} loaded, {} skipped, {} failed ({})",
            self.files_loaded,
            self.files_skipped,
            self.files_failed,
            format_duration(self.elapsed)
        )
    }
}

/// Aggregate result of one orchestrator run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub dry_run: bool,
    pub tables: Vec<TableReport>,
}

impl RunSummary {
    pub fn files_loaded(&self) -> usize {
        self.tables.iter().map(|t| t.files_loaded).sum()
    }

    pub fn files_skipped(&self) -> usize {
        self.tables.iter().map(|t| t.files_skipped).sum()
    }

    pub fn files_failed(&self) -> usize {
        self.tables.iter().map(|t| t.files_failed).sum()
    }

    pub fn planned_loads(&self) -> usize {
        self.tables.iter().map(|t| t.planned_loads).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadFailure> {
        self.tables.iter().flat_map(|t| t.errors.iter())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Console block printed at the end of a run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let kind = if self.dry_run { "dry run" } else { "run" };
        out.push_str(&format!(
            "=== {} {} started {} ===\n",
            kind,
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        for table in &self.tables {
            out.push_str(&format!(
                "{:<28} {:<24} {}\n",
                table.table,
                table.outcome.to_string(),
                table.detail()
            ));
        }
        if self.dry_run {
            out.push_str(&format!(
                "planned: {} load(s) across {} table(s)\n",
                self.planned_loads(),
                self.tables.len()
            ));
        } else {
            out.push_str(&format!(
                "files: {} loaded, {} skipped, {} failed in {}\n",
                self.files_loaded(),
                self.files_skipped(),
                self.files_failed(),
                format_duration(self.elapsed)
            ));
        }
        let failures: Vec<String> = self.failures().map(|f| format!("  - {}", f)).collect();
        if !failures.is_empty() {
            out.push_str("failures:\n");
            out.push_str(&failures.iter().join("\n"));
            out.push('\n');
        }
        out
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        return format!("{:.1}s", d.as_secs_f64());
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}
