//! Core abstractions shared by the drivers and the migration steps.
//!
//! - [`value`]: SQL value representation
//! - [`snapshot`]: in-memory copy of one source table
//! - [`traits`]: source and target connection traits
//!
//! The steps in `transfer`, `script` and `orchestrator` only see these
//! types, so tests can substitute in-memory connections for the real drivers.

pub mod snapshot;
pub mod traits;
pub mod value;

pub use snapshot::TableSnapshot;
pub use traits::{RowSet, SourceConnection, TargetConnection};
pub use value::{SqlNullType, SqlValue};

/// Quote an SQL Server identifier with brackets.
pub fn quote_mssql_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a MySQL identifier with backticks.
pub fn quote_mysql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mssql_ident() {
        assert_eq!(quote_mssql_ident("Stage_Items"), "[Stage_Items]");
        assert_eq!(quote_mssql_ident("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_quote_mysql_ident() {
        assert_eq!(quote_mysql_ident("Items"), "`Items`");
        assert_eq!(quote_mysql_ident("we`ird"), "`we``ird`");
    }
}
