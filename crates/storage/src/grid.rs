use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stockroom_core::{Cell, Row};

use crate::atomic::atomic_write;
use crate::error::StorageError;
use crate::traits::{SheetDimension, SpreadsheetIo, Worksheet};

pub const GRID_EXTENSION: &str = "grid";
pub const GRID_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub value: Cell,
}

/// On-disk body of a `.grid` document: the reported used range plus the
/// non-empty cells, MessagePack encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridFile {
    pub version: u32,
    pub first_row: i64,
    pub last_row: i64,
    pub first_col: i64,
    pub last_col: i64,
    pub cells: Vec<GridCell>,
}

impl GridFile {
    pub fn from_rows(rows: &[Row]) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let dimension = if rows.is_empty() || width == 0 {
            SheetDimension::EMPTY
        } else {
            SheetDimension {
                first_row: 1,
                last_row: rows.len() as i64,
                first_col: 1,
                last_col: width as i64,
            }
        };

        let mut cells = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    cells.push(GridCell {
                        row: r as u32 + 1,
                        col: c as u32 + 1,
                        value: value.clone(),
                    });
                }
            }
        }

        Self {
            version: GRID_FORMAT_VERSION,
            first_row: dimension.first_row,
            last_row: dimension.last_row,
            first_col: dimension.first_col,
            last_col: dimension.last_col,
            cells,
        }
    }

    pub fn dimension(&self) -> SheetDimension {
        SheetDimension {
            first_row: self.first_row,
            last_row: self.last_row,
            first_col: self.first_col,
            last_col: self.last_col,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, StorageError> {
        rmp_serde::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, StorageError> {
        rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

struct GridSheet {
    dimension: SheetDimension,
    cells: BTreeMap<(u32, u32), Cell>,
}

impl Worksheet for GridSheet {
    fn dimension(&self) -> SheetDimension {
        self.dimension
    }

    fn cell_at(&self, row: u32, col: u32) -> Option<Cell> {
        self.cells.get(&(row, col)).cloned()
    }
}

/// Default document codec: a sparse MessagePack grid under `.grid`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridFileIo;

impl GridFileIo {
    pub fn read_file(path: &Path) -> Result<GridFile, StorageError> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::Io(e),
        })?;
        let file = GridFile::from_msgpack(&bytes)?;
        if file.version != GRID_FORMAT_VERSION {
            return Err(StorageError::Serialization(format!(
                "unsupported grid version {}",
                file.version
            )));
        }
        Ok(file)
    }

    pub fn write_file(path: &Path, file: &GridFile) -> Result<(), StorageError> {
        atomic_write(path, &file.to_msgpack()?)
    }
}

impl SpreadsheetIo for GridFileIo {
    fn extensions(&self) -> &[&'static str] {
        &[GRID_EXTENSION]
    }

    fn default_extension(&self) -> &'static str {
        GRID_EXTENSION
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Worksheet>, StorageError> {
        let file = Self::read_file(path)?;
        let dimension = file.dimension();
        let cells = file
            .cells
            .into_iter()
            .map(|c| ((c.row, c.col), c.value))
            .collect();
        Ok(Box::new(GridSheet { dimension, cells }))
    }

    fn write(&self, path: &Path, rows: &[Row]) -> Result<(), StorageError> {
        Self::write_file(path, &GridFile::from_rows(rows))
    }
}
