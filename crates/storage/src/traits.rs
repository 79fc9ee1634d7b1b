use std::path::Path;

use stockroom_core::{Cell, Row};

use crate::error::StorageError;

/// Used range of a worksheet, 1-based and inclusive. Producers are not
/// trusted: `last_row < first_row` and non-positive bounds show up in files
/// written by other tools, and readers must cope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetDimension {
    pub first_row: i64,
    pub last_row: i64,
    pub first_col: i64,
    pub last_col: i64,
}

impl SheetDimension {
    /// The range reported for a sheet with no cells at all.
    pub const EMPTY: SheetDimension = SheetDimension {
        first_row: -1,
        last_row: -2,
        first_col: -1,
        last_col: -2,
    };
}

/// Read access to the single sheet of a tabular document.
pub trait Worksheet {
    fn dimension(&self) -> SheetDimension;

    /// Value at a 1-based address, `None` when the cell was never written.
    fn cell_at(&self, row: u32, col: u32) -> Option<Cell>;
}

/// Reads and writes tabular documents in one on-disk format.
pub trait SpreadsheetIo {
    /// Lowercase extensions (without the dot) this format accepts.
    fn extensions(&self) -> &[&'static str];

    /// Extension appended to save paths that carry none of `extensions()`.
    fn default_extension(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn Worksheet>, StorageError>;

    /// Write `rows` starting at row 1, column 1.
    fn write(&self, path: &Path, rows: &[Row]) -> Result<(), StorageError>;

    fn is_recognized(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .is_some_and(|e| self.extensions().contains(&e.as_str()))
    }
}

/// Small persistent string-keyed settings store.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}
