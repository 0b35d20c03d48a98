//! In-memory copy of one source table.

use super::value::SqlValue;

/// Full contents of one source table at extraction time.
///
/// Rows are positional and aligned with `columns`. A snapshot is read-only
/// once produced and is dropped after it has been loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    /// Source table name.
    pub table: String,
    /// Column names in source order.
    pub columns: Vec<String>,
    /// Rows in source order.
    pub rows: Vec<Vec<SqlValue>>,
}

impl TableSnapshot {
    pub fn new(table: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a value by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Check that every row has one value per column.
    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|r| r.len() == self.columns.len())
    }
}
