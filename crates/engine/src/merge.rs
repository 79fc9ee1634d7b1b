//! Folding a purchase document into the stock table.
//!
//! Rows are matched on the part name (trimmed, case-insensitive). A matched
//! row gets the purchased quantity added to its stock and its descriptive
//! columns overwritten only where the purchase row has something to say; an
//! unmatched row is appended with the purchased quantity as its stock.

use std::collections::HashSet;

use stockroom_core::schema::{self, COLUMN_COUNT, PART_NAME, QUANTITY, SPARSE_COLUMNS};
use stockroom_core::{Cell, Dataset, Row, TableStore};
use stockroom_storage::Worksheet;
use stockroom_storage::loader::scan_range;

use crate::error::StructureError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub rows_added: usize,
    pub rows_updated: usize,
}

/// First data row whose part name matches `name`, skipping the header.
/// Duplicates in the table are not resolved; the earliest one wins.
pub fn match_by_key(dataset: &Dataset, name: &str) -> Option<usize> {
    let key = schema::match_key(name);
    dataset
        .rows()
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| {
            row.get(PART_NAME)
                .is_some_and(|cell| schema::match_key(&cell.to_text()) == key)
        })
        .map(|(index, _)| index)
}

/// Accept only documents whose quantity header (column 3) reads "Purchase".
pub fn validate_delta_structure(sheet: &dyn Worksheet) -> Result<(), StructureError> {
    let header = sheet
        .cell_at(1, QUANTITY as u32 + 1)
        .map(|c| c.to_text().trim().to_string())
        .unwrap_or_default();

    match header.to_lowercase().as_str() {
        "purchase" => Ok(()),
        "stock" => Err(StructureError::StockDocument),
        _ => Err(StructureError::UnexpectedHeader(header)),
    }
}

/// The data rows of a delta sheet, seven cells each, header excluded.
pub fn read_delta_rows(sheet: &dyn Worksheet) -> Vec<Row> {
    let range = scan_range(sheet.dimension());
    (range.first_row.max(2)..=range.last_row)
        .map(|r| {
            (1..=COLUMN_COUNT as u32)
                .map(|c| sheet.cell_at(r, c).unwrap_or(Cell::Empty))
                .collect()
        })
        .collect()
}

fn update_existing(table: &mut TableStore, row: usize, delta: &Row) {
    let current = table.get(row, QUANTITY).map_or(0, Cell::to_quantity);
    let purchased = delta[QUANTITY].to_quantity();
    let stock = current.saturating_add(purchased);
    log::debug!("  row {row}: stock {current} + {purchased} = {stock}");
    table.set(row, QUANTITY, Cell::Integer(stock));

    for col in SPARSE_COLUMNS {
        if !delta[col].is_blank() {
            table.set(row, col, delta[col].clone());
        }
    }
}

fn insert_new(table: &mut TableStore, name: &str, delta: &Row) -> usize {
    let row = table.append_row();
    for (col, value) in delta.iter().enumerate() {
        let value = match col {
            PART_NAME => Cell::text(name),
            QUANTITY => Cell::Integer(value.to_quantity()),
            _ => value.clone(),
        };
        table.set(row, col, value);
    }
    log::debug!("  appended as row {row} with stock {}", delta[QUANTITY].to_quantity());
    row
}

/// Apply already-validated delta rows to the table.
pub fn merge_rows(table: &mut TableStore, delta_rows: &[Row]) -> MergeReport {
    let mut report = MergeReport::default();
    let mut seen = HashSet::new();

    for (offset, raw) in delta_rows.iter().enumerate() {
        let mut delta = raw.clone();
        delta.resize(COLUMN_COUNT, Cell::Empty);

        let name = delta[PART_NAME].to_text().trim().to_string();
        if name.is_empty() {
            continue;
        }
        if !seen.insert(schema::match_key(&name)) {
            log::debug!("delta row {}: duplicate '{name}' skipped", offset + 2);
            continue;
        }

        match match_by_key(table.dataset(), &name) {
            Some(row) => {
                log::debug!("delta row {}: '{name}' matches stock row {row}", offset + 2);
                update_existing(table, row, &delta);
                report.rows_updated += 1;
            }
            None => {
                log::debug!("delta row {}: '{name}' is new", offset + 2);
                insert_new(table, &name, &delta);
                report.rows_added += 1;
            }
        }
    }

    report
}
