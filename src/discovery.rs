//! Export file discovery
//!
//! Scans the export directory once and groups `<table>_part*.csv` files by
//! catalog table. File order inside a group is lexicographic by file name,
//! which is the load order everywhere downstream; exports are expected to
//! zero-pad part numbers so that order matches part order.

use crate::catalog::Catalog;
use crate::error::{LoaderError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One part file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFile {
    pub path: PathBuf,
    pub bytes: u64,
}

impl PartFile {
    /// File name without directory, used as the progress-store key suffix
    /// and in log lines.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// All part files discovered for one table, in load order.
#[derive(Debug, Clone, Default)]
pub struct FileGroup {
    pub files: Vec<PartFile>,
    pub total_bytes: u64,
}

impl FileGroup {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }
}

/// Scan `dir` and group part files by table. Tables with no matching files
/// are absent from the result; an empty result is not an error here, the
/// caller decides whether that is fatal.
pub fn discover(dir: &Path, catalog: &Catalog) -> Result<BTreeMap<String, FileGroup>> {
    if !dir.is_dir() {
        return Err(LoaderError::Setup(format!(
            "export directory {} does not exist",
            dir.display()
        )));
    }

    let mut entries: Vec<(String, PathBuf, u64)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        let bytes = entry.metadata()?.len();
        entries.push((name, path, bytes));
    }
    // Lexicographic by file name fixes the load order for every group.
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut groups: BTreeMap<String, FileGroup> = BTreeMap::new();
    for (name, path, bytes) in entries {
        let Some(table) = table_for(&name, catalog) else {
            continue;
        };
        let group = groups.entry(table).or_default();
        group.total_bytes += bytes;
        group.files.push(PartFile { path, bytes });
    }

    for (table, group) in &groups {
        debug!(
            "discovered {} part file(s) for {} ({} bytes)",
            group.len(),
            table,
            group.total_bytes
        );
    }
    Ok(groups)
}

/// Match `<table>_part*.csv` against the catalog. Longer table names win
/// automatically because names are unique prefixes in PATSTAT, so a single
/// scan over the catalog is enough.
fn table_for(file_name: &str, catalog: &Catalog) -> Option<String> {
    for table in catalog.names() {
        let Some(rest) = file_name.strip_prefix(table) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix("_part") else {
            continue;
        };
        if rest.ends_with(".csv") {
            return Some(table.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use std::fs;

    fn temp_export_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("patload_discovery_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(dir: &Path, name: &str, bytes: usize) {
        fs::write(dir.join(name), vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_discover_groups_and_orders_files() {
        let dir = temp_export_dir();
        touch(&dir, "tls801_country_part02.csv", 10);
        touch(&dir, "tls801_country_part01.csv", 20);
        touch(&dir, "tls801_country_part10.csv", 5);
        touch(&dir, "tls904_nuts_part01.csv", 7);

        let groups = discover(&dir, &Catalog::patstat()).unwrap();
        assert_eq!(groups.len(), 2);

        let country = &groups["tls801_country"];
        let names: Vec<String> = country.files.iter().map(|f| f.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "tls801_country_part01.csv",
                "tls801_country_part02.csv",
                "tls801_country_part10.csv",
            ]
        );
        assert_eq!(country.total_bytes, 35);
        assert_eq!(groups["tls904_nuts"].len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_discover_ignores_non_matching_files() {
        let dir = temp_export_dir();
        touch(&dir, "tls801_country_part01.csv", 1);
        touch(&dir, "tls801_country.csv", 1);
        touch(&dir, "tls801_country_part01.csv.gz", 1);
        touch(&dir, "TLS801_COUNTRY_part01.csv", 1);
        touch(&dir, "readme.txt", 1);
        touch(&dir, "tls999_unknown_part01.csv", 1);

        let groups = discover(&dir, &Catalog::patstat()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["tls801_country"].len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_discover_missing_dir_is_setup_error() {
        let dir = std::env::temp_dir().join(format!("patload_missing_{}", uuid::Uuid::new_v4()));
        let err = discover(&dir, &Catalog::patstat()).unwrap_err();
        assert!(matches!(err, LoaderError::Setup(_)));
    }

    #[test]
    fn test_discover_empty_dir_yields_empty_map() {
        let dir = temp_export_dir();
        let groups = discover(&dir, &Catalog::patstat()).unwrap();
        assert!(groups.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }
}
