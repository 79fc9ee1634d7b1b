use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single typed grid value. Spreadsheets hand back text or whole numbers;
/// anything else is flattened to one of these by the codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Integer(i64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// True when the cell renders as nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Integer(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Display form of the cell, borrowed when possible.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Cell::Empty => Cow::Borrowed(""),
            Cell::Text(s) => Cow::Borrowed(s),
            Cell::Integer(n) => Cow::Owned(n.to_string()),
        }
    }

    /// Quantity reading: integers as-is, numeric text parsed, everything else 0.
    pub fn to_quantity(&self) -> i64 {
        match self {
            Cell::Integer(n) => *n,
            Cell::Text(s) => s.trim().parse().unwrap_or(0),
            Cell::Empty => 0,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Integer(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_parsing() {
        assert_eq!(Cell::Integer(12).to_quantity(), 12);
        assert_eq!(Cell::text(" 7 ").to_quantity(), 7);
        assert_eq!(Cell::text("-3").to_quantity(), -3);
        assert_eq!(Cell::text("a dozen").to_quantity(), 0);
        assert_eq!(Cell::text("2.5").to_quantity(), 0);
        assert_eq!(Cell::Empty.to_quantity(), 0);
    }

    #[test]
    fn blankness() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::text("   ").is_blank());
        assert!(!Cell::text(" x ").is_blank());
        assert!(!Cell::Integer(0).is_blank());
    }

    #[test]
    fn display_form() {
        assert_eq!(Cell::Integer(42).to_string(), "42");
        assert_eq!(Cell::text("Bolt").to_string(), "Bolt");
        assert_eq!(Cell::Empty.to_string(), "");
    }
}
