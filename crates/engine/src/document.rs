use std::cell::Cell as StdCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use stockroom_core::{Dataset, TableChange, TableStore};
use stockroom_storage::SpreadsheetIo;
use stockroom_storage::loader::{load_dataset, save_dataset};

use crate::error::EngineError;
use crate::sync::LocalDocument;

/// Remembers whether the table changed since the last load or save.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty: Rc<StdCell<bool>>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table listener that marks this tracker dirty.
    pub fn listener(&self) -> Box<dyn FnMut(&TableChange)> {
        let dirty = Rc::clone(&self.dirty);
        Box::new(move |_change: &TableChange| dirty.set(true))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_clean(&self) {
        self.dirty.set(false);
    }
}

/// The table being edited plus the file it belongs to.
pub struct Document {
    table: TableStore,
    io: Rc<dyn SpreadsheetIo>,
    current: Option<PathBuf>,
    dirty: DirtyTracker,
}

impl Document {
    pub fn new(io: Rc<dyn SpreadsheetIo>) -> Self {
        let dirty = DirtyTracker::new();
        let mut table = TableStore::new();
        table.subscribe(dirty.listener());
        Self {
            table,
            io,
            current: None,
            dirty,
        }
    }

    pub fn table(&self) -> &TableStore {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TableStore {
        &mut self.table
    }

    pub fn io(&self) -> &dyn SpreadsheetIo {
        self.io.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Install a fresh, unsaved dataset.
    pub fn reset(&mut self, dataset: Dataset) {
        self.table.replace_all(dataset);
        self.current = None;
        self.dirty.mark_clean();
    }

    /// Fail unless `path` exists and carries a recognized extension.
    pub fn check_readable(&self, path: &Path) -> Result<(), EngineError> {
        if !path.exists() {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }
        if !self.io.is_recognized(path) {
            return Err(EngineError::Format {
                extension: path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default(),
                expected: self.io.extensions().join(", "),
            });
        }
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        self.check_readable(path)?;
        let dataset = load_dataset(self.io.as_ref(), path).map_err(|source| EngineError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        if dataset.is_empty() {
            return Err(EngineError::EmptyDocument(path.to_path_buf()));
        }

        self.table.replace_all(dataset);
        self.current = Some(path.to_path_buf());
        self.dirty.mark_clean();
        Ok(())
    }

    /// Save to `path`, or to the current file when `None`.
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf, EngineError> {
        let target = path
            .or(self.current.as_deref())
            .map(Path::to_path_buf)
            .ok_or(EngineError::NotConfigured("file path"))?;
        let written = save_dataset(self.io.as_ref(), &target, self.table.dataset())?;
        self.current = Some(written.clone());
        self.dirty.mark_clean();
        Ok(written)
    }
}

impl LocalDocument for Document {
    fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn save_to(&mut self, path: &Path) -> Result<PathBuf, EngineError> {
        self.save(Some(path))
    }

    fn load_from(&mut self, path: &Path) -> Result<(), EngineError> {
        self.load(path)
    }

    fn set_current_path(&mut self, path: PathBuf) {
        self.current = Some(path);
    }
}
