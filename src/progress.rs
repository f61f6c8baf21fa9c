//! Durable load progress
//!
//! A small JSON document next to the export keeps the set of files already
//! loaded and the set of tables marked complete. Every mutation is written
//! through to disk before the loader moves on, so a crash at any point loses
//! at most the load that was in flight. Writes go to a sibling temp file and
//! then rename over the target so the document is never half-written.

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Default progress file name, created inside the export directory.
pub const PROGRESS_FILE_NAME: &str = "load_progress.json";

/// The on-disk document. Exactly two keys so older runs stay readable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressDocument {
    #[serde(default)]
    pub loaded_files: BTreeSet<String>,
    #[serde(default)]
    pub completed_tables: BTreeSet<String>,
}

/// Write-through progress store. Mutators persist before returning.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    doc: ProgressDocument,
}

impl ProgressStore {
    /// Fresh store at `path`, ignoring any document already there.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProgressStore {
            path: path.into(),
            doc: ProgressDocument::default(),
        }
    }

    /// Load an existing document, or start empty if the file is absent.
    /// A present-but-unreadable file is an error; silently starting over
    /// would re-trigger replace loads.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            info!("no progress file at {}, starting fresh", path.display());
            return Ok(ProgressStore::new(path));
        }
        let content = std::fs::read_to_string(&path)?;
        let doc: ProgressDocument = serde_json::from_str(&content).map_err(|e| {
            LoaderError::Progress(format!("failed to parse {}: {}", path.display(), e))
        })?;
        info!(
            "resuming from {}: {} file(s) loaded, {} table(s) complete",
            path.display(),
            doc.loaded_files.len(),
            doc.completed_tables.len()
        );
        Ok(ProgressStore { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self, file: &Path) -> bool {
        self.doc.loaded_files.contains(key_for(file).as_str())
    }

    pub fn is_completed(&self, table: &str) -> bool {
        self.doc.completed_tables.contains(table)
    }

    /// How many of the given files this store has already seen. The replace
    /// decision keys off this being zero.
    pub fn loaded_count_for<'a>(&self, files: impl Iterator<Item = &'a Path>) -> usize {
        files.filter(|f| self.is_loaded(f)).count()
    }

    pub fn mark_loaded(&mut self, file: &Path) -> Result<()> {
        self.doc.loaded_files.insert(key_for(file));
        self.save()
    }

    pub fn mark_completed(&mut self, table: &str) -> Result<()> {
        self.doc.completed_tables.insert(table.to_string());
        self.save()
    }

    pub fn loaded_files(&self) -> &BTreeSet<String> {
        &self.doc.loaded_files
    }

    pub fn completed_tables(&self) -> &BTreeSet<String> {
        &self.doc.completed_tables
    }

    fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Progress keys are full paths, stringified losslessly where possible.
fn key_for(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

/// Cloneable handle shared between table workers. The mutex scope is one
/// check or one write-through, never a whole load.
#[derive(Debug, Clone)]
pub struct SharedProgress(Arc<Mutex<ProgressStore>>);

impl SharedProgress {
    pub fn new(store: ProgressStore) -> Self {
        SharedProgress(Arc::new(Mutex::new(store)))
    }

    pub fn lock(&self) -> Result<std::sync::MutexGuard<'_, ProgressStore>> {
        self.0.lock().map_err(|_| LoaderError::ProgressLock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_progress_path() -> PathBuf {
        std::env::temp_dir().join(format!("patload_progress_{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_marks_persist_across_reload() {
        let path = temp_progress_path();
        let file = Path::new("/exports/tls801_country_part01.csv");

        let mut store = ProgressStore::new(&path);
        store.mark_loaded(file).unwrap();
        store.mark_completed("tls801_country").unwrap();

        let reloaded = ProgressStore::load(&path).unwrap();
        assert!(reloaded.is_loaded(file));
        assert!(reloaded.is_completed("tls801_country"));
        assert!(!reloaded.is_loaded(Path::new("/exports/tls801_country_part02.csv")));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_through_leaves_no_temp_file() {
        let path = temp_progress_path();
        let mut store = ProgressStore::new(&path);
        store.mark_loaded(Path::new("a.csv")).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let content = fs::read_to_string(&path).unwrap();
        let doc: ProgressDocument = serde_json::from_str(&content).unwrap();
        assert_eq!(doc.loaded_files.len(), 1);
        assert!(doc.completed_tables.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let path = temp_progress_path();
        let store = ProgressStore::load(&path).unwrap();
        assert!(store.loaded_files().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let path = temp_progress_path();
        fs::write(&path, "{not json").unwrap();
        let err = ProgressStore::load(&path).unwrap_err();
        assert!(matches!(err, LoaderError::Progress(_)));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_loaded_count_for() {
        let path = temp_progress_path();
        let mut store = ProgressStore::new(&path);
        store.mark_loaded(Path::new("t_part01.csv")).unwrap();
        store.mark_loaded(Path::new("t_part02.csv")).unwrap();

        let files = [
            PathBuf::from("t_part01.csv"),
            PathBuf::from("t_part02.csv"),
            PathBuf::from("t_part03.csv"),
        ];
        let count = store.loaded_count_for(files.iter().map(PathBuf::as_path));
        assert_eq!(count, 2);

        fs::remove_file(&path).unwrap();
    }
}
