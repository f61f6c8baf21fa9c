//! Row-count verification
//!
//! Compares warehouse row counts against the catalog's expected counts and
//! classifies each table. Counting is the only check; duplicate detection
//! needs checksums the exports do not carry.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::warehouse::Warehouse;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Count matches the catalog exactly.
    Ok { rows: u64 },
    /// Table exists but holds zero rows.
    Empty,
    /// Table is absent from the dataset.
    NotFound,
    /// Count differs from the catalog; over 100% means double-loaded rows.
    Partial { actual: u64, expected: u64 },
}

impl VerifyStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, VerifyStatus::Ok { .. })
    }
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyStatus::Ok { rows } => write!(f, "OK ({} rows)", rows),
            VerifyStatus::Empty => write!(f, "EMPTY"),
            VerifyStatus::NotFound => write!(f, "NOT FOUND"),
            VerifyStatus::Partial { actual, expected } => {
                if *expected == 0 {
                    write!(f, "PARTIAL ({} rows, none expected)", actual)
                } else {
                    let pct = *actual as f64 / *expected as f64 * 100.0;
                    write!(f, "PARTIAL ({} of {} rows, {:.1}%)", actual, expected, pct)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableVerification {
    pub table: String,
    pub expected: u64,
    pub status: VerifyStatus,
}

impl fmt::Display for TableVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table, self.status)
    }
}

/// Check every catalog table, in catalog order. Count transport failures
/// abort the pass; a missing table is a classification, not an error.
pub async fn verify(warehouse: &dyn Warehouse, catalog: &Catalog) -> Result<Vec<TableVerification>> {
    let mut results = Vec::with_capacity(catalog.len());
    for def in catalog.iter() {
        let actual = warehouse.row_count(&def.name).await?;
        let status = classify(actual, def.expected_rows);
        let verification = TableVerification {
            table: def.name.clone(),
            expected: def.expected_rows,
            status,
        };
        if status.is_ok() {
            info!("{}", verification);
        } else {
            warn!("{}", verification);
        }
        results.push(verification);
    }
    Ok(results)
}

fn classify(actual: Option<u64>, expected: u64) -> VerifyStatus {
    match actual {
        None => VerifyStatus::NotFound,
        Some(0) => VerifyStatus::Empty,
        Some(rows) if rows == expected => VerifyStatus::Ok { rows },
        Some(rows) => VerifyStatus::Partial {
            actual: rows,
            expected,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, 242), VerifyStatus::NotFound);
        assert_eq!(classify(Some(0), 242), VerifyStatus::Empty);
        assert_eq!(classify(Some(242), 242), VerifyStatus::Ok { rows: 242 });
        assert_eq!(
            classify(Some(121), 242),
            VerifyStatus::Partial {
                actual: 121,
                expected: 242
            }
        );
        // A table nothing was expected in classifies as empty when empty.
        assert_eq!(classify(Some(0), 0), VerifyStatus::Empty);
    }

    #[test]
    fn test_partial_display_with_percentage() {
        let half = VerifyStatus::Partial {
            actual: 121,
            expected: 242,
        };
        assert_eq!(half.to_string(), "PARTIAL (121 of 242 rows, 50.0%)");

        let over = VerifyStatus::Partial {
            actual: 484,
            expected: 242,
        };
        assert_eq!(over.to_string(), "PARTIAL (484 of 242 rows, 200.0%)");

        let unexpected = VerifyStatus::Partial {
            actual: 5,
            expected: 0,
        };
        assert_eq!(unexpected.to_string(), "PARTIAL (5 rows, none expected)");
    }

    #[test]
    fn test_status_rendering() {
        assert_eq!(VerifyStatus::Ok { rows: 242 }.to_string(), "OK (242 rows)");
        assert_eq!(VerifyStatus::Empty.to_string(), "EMPTY");
        assert_eq!(VerifyStatus::NotFound.to_string(), "NOT FOUND");
    }
}
