//! File-backed dictionary source.
//!
//! Rows live in a JSON array on disk and are loaded into memory at startup.
//! [`FileSource::reload`] picks up edits to the file without rebuilding the
//! cache in front of it. A reload builds the new row set off to the side and
//! swaps it in whole, so concurrent loads see either the old rows or the new.
//!
//! # File Format
//!
//! ```text
//! [
//!   { "key": 1, "values": ["alice", 31] },
//!   { "key": 2, "values": ["bob", 27] }
//! ]
//! ```
//!
//! Values are given in structure order and coerced to the declared types.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use dictcache_core::error::{DictError, Result};
use dictcache_core::traits::DictionarySource;
use dictcache_core::types::{DictionaryStructure, Key, SourceRow};

use crate::MemorySource;

/// Dictionary source reading rows from a JSON file.
#[derive(Debug)]
pub struct FileSource {
    /// Path to the rows file
    path: PathBuf,
    /// Attribute structure rows are coerced to
    structure: DictionaryStructure,
    /// Current row set, replaced whole on reload
    memory: RwLock<Arc<MemorySource>>,
}

impl FileSource {
    /// Opens the rows file at `path` and loads it.
    ///
    /// # Errors
    /// `IoError` if the file cannot be read, `JsonError` if it is not a row
    /// array, `InvalidRow` if a row does not fit the structure.
    pub fn open(path: impl AsRef<Path>, structure: DictionaryStructure) -> Result<Self> {
        let source = Self {
            path: path.as_ref().to_path_buf(),
            memory: RwLock::new(Arc::new(MemorySource::new(structure.clone()))),
            structure,
        };
        source.reload()?;
        Ok(source)
    }

    /// Re-reads the file, replacing every loaded row.
    ///
    /// On error the previously loaded rows stay in place.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn reload(&self) -> Result<usize> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            DictError::IoError(std::io::Error::new(e.kind(), format!("Failed to open rows file: {}", e)))
        })?;
        let rows: Vec<SourceRow> = serde_json::from_str(&contents)?;

        let loaded = MemorySource::with_rows(self.structure.clone(), rows)?;
        let count = loaded.len();

        *self.memory.write() = Arc::new(loaded);
        info!(count, "Loaded rows from file");
        Ok(count)
    }

    /// Writes every loaded row back to the file.
    ///
    /// Writes to a temporary file first, then renames it over the original.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn save(&self) -> Result<()> {
        let rows = self.memory().all_rows();
        let serialized = serde_json::to_vec_pretty(&rows)?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, serialized)?;
        fs::rename(&temp_path, &self.path)?;

        debug!(count = rows.len(), "Rows saved");
        Ok(())
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current row set for direct access.
    ///
    /// Edits land in this row set only; the next reload replaces it.
    pub fn memory(&self) -> Arc<MemorySource> {
        Arc::clone(&*self.memory.read())
    }

    /// Returns the number of loaded rows.
    pub fn len(&self) -> usize {
        self.memory().len()
    }

    /// Returns true if no rows are loaded.
    pub fn is_empty(&self) -> bool {
        self.memory().is_empty()
    }
}

impl DictionarySource for FileSource {
    fn load_keys(&self, keys: &[Key]) -> Result<Vec<SourceRow>> {
        self.memory().load_keys(keys)
    }

    fn describe(&self) -> String {
        format!("file {} ({} rows)", self.path.display(), self.len())
    }
}
