use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::Cell;

pub type Row = Vec<Cell>;

/// Column count used when a row is appended to an empty table.
pub const DEFAULT_COLUMNS: usize = 7;

/// A rectangular grid whose first row is the header. Every row has exactly
/// as many cells as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Build a dataset, padding or truncating every row to the header width.
    pub fn from_rows(mut rows: Vec<Row>) -> Self {
        if let Some(width) = rows.first().map(Vec::len) {
            for row in &mut rows {
                row.resize(width, Cell::Empty);
            }
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    CellChanged { row: usize, col: usize },
    RowAppended { row: usize },
    ColumnAppended { col: usize },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ChangeListener = Box<dyn FnMut(&TableChange)>;

/// In-memory grid with change notification. Knows nothing about what the
/// columns mean.
pub struct TableStore {
    data: Dataset,
    listeners: Vec<(SubscriptionId, ChangeListener)>,
    next_subscription: u64,
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStore")
            .field("rows", &self.data.row_count())
            .field("columns", &self.data.column_count())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TableStore {
    pub fn new() -> Self {
        Self {
            data: Dataset::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn subscribe(&mut self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, change: TableChange) {
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.data
    }

    pub fn row_count(&self) -> usize {
        self.data.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.data.column_count()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.data.get(row, col)
    }

    /// Overwrite one cell. Out-of-bounds writes are refused, never grown into.
    pub fn set(&mut self, row: usize, col: usize, value: Cell) -> bool {
        let Some(slot) = self.data.rows.get_mut(row).and_then(|r| r.get_mut(col)) else {
            return false;
        };
        *slot = value;
        self.notify(TableChange::CellChanged { row, col });
        true
    }

    /// Append an empty row and return its index.
    pub fn append_row(&mut self) -> usize {
        let width = if self.data.is_empty() {
            DEFAULT_COLUMNS
        } else {
            self.data.column_count()
        };
        self.data.rows.push(vec![Cell::Empty; width]);
        let row = self.data.rows.len() - 1;
        self.notify(TableChange::RowAppended { row });
        row
    }

    /// Grow every row by one empty cell. No-op on an empty table.
    pub fn append_column(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let col = self.data.column_count();
        for row in &mut self.data.rows {
            row.push(Cell::Empty);
        }
        self.notify(TableChange::ColumnAppended { col });
    }

    pub fn replace_all(&mut self, dataset: Dataset) {
        self.data = dataset;
        self.notify(TableChange::Reset);
    }

    pub fn clear(&mut self) {
        self.data = Dataset::new();
        self.notify(TableChange::Reset);
    }
}
