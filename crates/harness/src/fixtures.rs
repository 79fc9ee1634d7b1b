use std::path::{Path, PathBuf};

use stockroom_core::{Cell, DocumentKind, Row};
use stockroom_storage::{GridFileIo, StorageError, SpreadsheetIo};

/// One part line: name, part number, quantity, vendor.
pub type PartLine<'a> = (&'a str, &'a str, i64, &'a str);

fn document(kind: DocumentKind, lines: &[PartLine<'_>]) -> Vec<Row> {
    let mut rows = vec![kind.header_row()];
    for &(name, part_no, quantity, vendor) in lines {
        rows.push(vec![
            Cell::text(name),
            Cell::text(part_no),
            Cell::Integer(quantity),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
            Cell::text(vendor),
        ]);
    }
    rows
}

pub fn stock_rows(lines: &[PartLine<'_>]) -> Vec<Row> {
    document(DocumentKind::Stock, lines)
}

pub fn purchase_rows(lines: &[PartLine<'_>]) -> Vec<Row> {
    document(DocumentKind::Purchase, lines)
}

/// Write `rows` as a grid document at `path`.
pub fn write_grid(path: &Path, rows: &[Row]) -> Result<PathBuf, StorageError> {
    GridFileIo.write(path, rows)?;
    Ok(path.to_path_buf())
}
