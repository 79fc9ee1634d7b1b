//! The fixed seven-column inventory layout shared by stock and purchase sheets.
//!
//! Both document kinds use the same columns; only the header text of the
//! quantity column differs, and that text is what tells them apart.

use crate::cell::Cell;
use crate::error::CoreError;
use crate::table::Row;

pub const PART_NAME: usize = 0;
pub const PART_NO: usize = 1;
pub const QUANTITY: usize = 2;
pub const DEPARTMENT: usize = 3;
pub const PREPARED_BY: usize = 4;
pub const APPROVED_BY: usize = 5;
pub const VENDOR: usize = 6;

pub const COLUMN_COUNT: usize = 7;

/// Columns a purchase row may overwrite on a matched stock row. Quantity is
/// accumulated instead, and the part name is the key itself.
pub const SPARSE_COLUMNS: [usize; 5] = [PART_NO, DEPARTMENT, PREPARED_BY, APPROVED_BY, VENDOR];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Stock,
    Purchase,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Purchase => "purchase",
        }
    }

    /// Header text of the quantity column.
    pub fn quantity_label(&self) -> &'static str {
        match self {
            Self::Stock => "Stock",
            Self::Purchase => "Purchase",
        }
    }

    /// Classify from the quantity header cell. Anything that is not
    /// "purchase" counts as stock.
    pub fn from_header(cell: &Cell) -> Self {
        if cell.to_text().trim().eq_ignore_ascii_case("purchase") {
            Self::Purchase
        } else {
            Self::Stock
        }
    }

    pub fn header_row(&self) -> Row {
        [
            "Part Name",
            "Part No",
            self.quantity_label(),
            "Department",
            "Prepared",
            "Approved",
            "Vendor Name",
        ]
        .into_iter()
        .map(Cell::from)
        .collect()
    }
}

/// Normalized part-name key: trimmed and lowercased.
pub fn match_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }
}
