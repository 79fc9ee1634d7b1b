//! Turning a worksheet into a normalized [`Dataset`] and back.
//!
//! Sheets written by other tools routinely report bogus used ranges and
//! carry thousands of formatted-but-empty rows, so loading scans
//! adaptively: the header decides the width, and a run of empty rows ends
//! the scan.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use stockroom_core::{Cell, Dataset, Row};

use crate::error::StorageError;
use crate::traits::{SheetDimension, SpreadsheetIo, Worksheet};

/// Last row scanned when the reported range is inverted.
pub const FALLBACK_LAST_ROW: u32 = 1000;
/// Last column scanned when the reported range is inverted (column Z).
pub const FALLBACK_LAST_COL: u32 = 26;
/// Columns beyond this are never read.
pub const MAX_SCAN_COL: u32 = 26;
/// Scanning stops after this many fully empty rows in a row.
pub const MAX_CONSECUTIVE_EMPTY_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u32,
    pub last_col: u32,
}

fn clamp_start(v: i64) -> u32 {
    v.clamp(1, u32::MAX as i64) as u32
}

/// Repair a reported range: starts below 1 become 1, and an end before its
/// start is replaced by the fallback bound.
pub fn scan_range(dim: SheetDimension) -> ScanRange {
    let first_row = clamp_start(dim.first_row);
    let first_col = clamp_start(dim.first_col);
    let last_row = if dim.last_row < first_row as i64 {
        FALLBACK_LAST_ROW
    } else {
        dim.last_row.min(u32::MAX as i64) as u32
    };
    let last_col = if dim.last_col < first_col as i64 {
        FALLBACK_LAST_COL
    } else {
        dim.last_col.min(u32::MAX as i64) as u32
    };
    ScanRange { first_row, last_row, first_col, last_col }
}

/// Read a sheet into a dataset. The first non-empty row is the header and is
/// cut after its last non-empty cell; every later row is padded or cut to
/// that width. Empty rows are dropped.
pub fn read_dataset(sheet: &dyn Worksheet) -> Dataset {
    let range = scan_range(sheet.dimension());
    let last_col = range.last_col.min(MAX_SCAN_COL);

    let mut rows: Vec<Row> = Vec::new();
    let mut empty_run = 0;

    for r in range.first_row..=range.last_row {
        let mut cells = Vec::new();
        let mut used = 0;
        for c in range.first_col..=last_col {
            let value = sheet.cell_at(r, c).unwrap_or(Cell::Empty);
            if !value.is_blank() {
                used = (c - range.first_col + 1) as usize;
            }
            cells.push(value);
        }

        if used == 0 {
            if r > range.first_row {
                empty_run += 1;
                if empty_run >= MAX_CONSECUTIVE_EMPTY_ROWS {
                    log::debug!("stopped scanning at row {r} after {empty_run} empty rows");
                    break;
                }
            }
            continue;
        }
        empty_run = 0;

        match rows.first().map(Vec::len) {
            None => cells.truncate(used),
            Some(width) => cells.resize(width, Cell::Empty),
        }
        rows.push(cells);
    }

    Dataset::from_rows(rows)
}

pub fn load_dataset(io: &dyn SpreadsheetIo, path: &Path) -> Result<Dataset, StorageError> {
    let sheet = io.open(path)?;
    let dataset = read_dataset(sheet.as_ref());
    log::debug!(
        "loaded {}: {} rows x {} columns",
        path.display(),
        dataset.row_count(),
        dataset.column_count()
    );
    Ok(dataset)
}

/// `path` with the codec's default extension appended when it carries none
/// of the recognized ones.
pub fn save_path(io: &dyn SpreadsheetIo, path: &Path) -> PathBuf {
    if io.is_recognized(path) {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(io.default_extension());
    PathBuf::from(name)
}

/// Write the dataset and return the path actually written.
pub fn save_dataset(
    io: &dyn SpreadsheetIo,
    path: &Path,
    dataset: &Dataset,
) -> Result<PathBuf, StorageError> {
    let target = save_path(io, path);
    io.write(&target, dataset.rows())?;
    log::debug!(
        "saved {}: {} rows x {} columns",
        target.display(),
        dataset.row_count(),
        dataset.column_count()
    );
    Ok(target)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::grid::GridFileIo;

    struct MapSheet {
        dimension: SheetDimension,
        cells: BTreeMap<(u32, u32), Cell>,
    }

    impl MapSheet {
        fn new(dimension: SheetDimension) -> Self {
            Self { dimension, cells: BTreeMap::new() }
        }

        fn put(mut self, row: u32, col: u32, value: Cell) -> Self {
            self.cells.insert((row, col), value);
            self
        }
    }

    impl Worksheet for MapSheet {
        fn dimension(&self) -> SheetDimension {
            self.dimension
        }

        fn cell_at(&self, row: u32, col: u32) -> Option<Cell> {
            self.cells.get(&(row, col)).cloned()
        }
    }

    fn dim(first_row: i64, last_row: i64, first_col: i64, last_col: i64) -> SheetDimension {
        SheetDimension { first_row, last_row, first_col, last_col }
    }

    #[test]
    fn inverted_range_falls_back_to_defaults() {
        let range = scan_range(SheetDimension::EMPTY);
        assert_eq!(
            range,
            ScanRange { first_row: 1, last_row: 1000, first_col: 1, last_col: 26 }
        );

        let range = scan_range(dim(3, 10, 2, 5));
        assert_eq!(range, ScanRange { first_row: 3, last_row: 10, first_col: 2, last_col: 5 });
    }

    #[test]
    fn header_width_comes_from_non_empty_header_cells() {
        let sheet = MapSheet::new(dim(1, 3, 1, 10))
            .put(1, 1, "Part Name".into())
            .put(1, 2, "Part No".into())
            .put(1, 3, "Stock".into())
            .put(2, 1, "Bolt".into())
            .put(2, 3, Cell::Integer(4))
            .put(3, 1, "Nut".into())
            .put(3, 8, "stray".into());

        let data = read_dataset(&sheet);
        assert_eq!(data.row_count(), 3);
        assert_eq!(data.column_count(), 3);
        assert_eq!(data.get(2, 0), Some(&Cell::text("Nut")));
        assert!(data.rows().iter().all(|r| r.len() == 3));
    }

    #[test]
    fn stops_after_five_empty_rows() {
        let sheet = MapSheet::new(dim(1, 20, 1, 2))
            .put(1, 1, "Part Name".into())
            .put(2, 1, "Bolt".into())
            .put(5, 1, "Nut".into())
            // rows 6..=10 empty, row 11 is never reached
            .put(11, 1, "Washer".into());

        let data = read_dataset(&sheet);
        let names: Vec<String> = data.rows().iter().map(|r| r[0].to_string()).collect();
        assert_eq!(names, vec!["Part Name", "Bolt", "Nut"]);
    }

    #[test]
    fn malformed_range_still_finds_data() {
        let sheet = MapSheet::new(dim(0, -5, 0, -5))
            .put(1, 1, "Part Name".into())
            .put(2, 1, "Bolt".into());
        let data = read_dataset(&sheet);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.column_count(), 1);
    }

    #[test]
    fn empty_sheet_yields_empty_dataset() {
        let sheet = MapSheet::new(SheetDimension::EMPTY);
        assert!(read_dataset(&sheet).is_empty());
    }

    #[test]
    fn save_path_appends_default_extension() {
        assert_eq!(save_path(&GridFileIo, Path::new("/d/stock")), PathBuf::from("/d/stock.grid"));
        assert_eq!(
            save_path(&GridFileIo, Path::new("/d/stock.csv")),
            PathBuf::from("/d/stock.csv.grid")
        );
        assert_eq!(save_path(&GridFileIo, Path::new("/d/stock.grid")), PathBuf::from("/d/stock.grid"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let data = Dataset::from_rows(vec![
            vec!["Part Name".into(), "Part No".into(), "Stock".into()],
            vec!["Bolt".into(), "P1".into(), Cell::Integer(10)],
            vec!["Nut".into(), Cell::Empty, Cell::Integer(0)],
        ]);

        let written = save_dataset(&GridFileIo, &dir.path().join("stock"), &data).unwrap();
        assert_eq!(written, dir.path().join("stock.grid"));
        assert_eq!(load_dataset(&GridFileIo, &written).unwrap(), data);
    }
}
