//! Idempotent table provisioning
//!
//! Probe for the table, create it only when absent. Re-running against a
//! dataset that already has every table is a no-op, which is what makes
//! resumed runs safe to start from the top.

use crate::catalog::{PartitionSpec, TableDefinition};
use crate::error::{LoaderError, Result};
use crate::warehouse::Warehouse;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Table was already there.
    Exists,
    Created,
    /// `--skip-create` was set; the table is assumed to exist.
    SkippedByFlag,
}

pub struct Provisioner {
    warehouse: Arc<dyn Warehouse>,
    skip_create: bool,
}

impl Provisioner {
    pub fn new(warehouse: Arc<dyn Warehouse>, skip_create: bool) -> Self {
        Provisioner {
            warehouse,
            skip_create,
        }
    }

    pub async fn ensure(&self, def: &TableDefinition) -> Result<ProvisionOutcome> {
        if self.skip_create {
            debug!("skipping provisioning for {} (--skip-create)", def.name);
            return Ok(ProvisionOutcome::SkippedByFlag);
        }
        let exists = self
            .warehouse
            .table_exists(&def.name)
            .await
            .map_err(|e| provision_error(&def.name, e))?;
        if exists {
            debug!("table {} already exists", def.name);
            return Ok(ProvisionOutcome::Exists);
        }
        info!("creating table {}", describe(def));
        self.warehouse
            .create_table(def)
            .await
            .map_err(|e| provision_error(&def.name, e))?;
        Ok(ProvisionOutcome::Created)
    }
}

fn provision_error(table: &str, err: LoaderError) -> LoaderError {
    match err {
        already @ LoaderError::Provision { .. } => already,
        other => LoaderError::Provision {
            table: table.to_string(),
            reason: other.to_string(),
        },
    }
}

/// One-line description used in creation logs and dry-run output.
pub fn describe(def: &TableDefinition) -> String {
    let mut parts = vec![format!("{} columns", def.column_count())];
    match &def.partition {
        Some(PartitionSpec::IntegerRange { column, .. }) => {
            parts.push(format!("partitioned by {}", column));
        }
        Some(PartitionSpec::Time { column, granularity }) => {
            parts.push(format!("partitioned by {} per {}", column, granularity));
        }
        None => {}
    }
    if !def.clustering.is_empty() {
        parts.push(format!("clustered by {}", def.clustering.iter().join(",")));
    }
    format!("{} ({})", def.name, parts.iter().join(", "))
}
