//! Connection traits the migration steps are written against.
//!
//! - [`SourceConnection`]: the operational database rows are read from
//! - [`TargetConnection`]: the database holding the staging tables
//!
//! Both are explicit handles passed into every operation. Each owns one
//! session with auto-commit disabled: a transaction is open from connect
//! until `commit`/`rollback`, and the next statement opens a new one.
//! `close` consumes the handle, so a handle can only be closed once.

use async_trait::async_trait;

use crate::error::Result;

use super::value::SqlValue;

/// Column names plus positional rows returned by [`SourceConnection::query_rows`].
pub type RowSet = (Vec<String>, Vec<Vec<SqlValue>>);

/// Read side of the migration.
#[async_trait]
pub trait SourceConnection: Send + Sized {
    /// Engine name used in log lines.
    fn name(&self) -> &str;

    /// Quote an identifier for this engine.
    fn quote_ident(&self, name: &str) -> String;

    /// Run a query and return every row in the order the server sent them.
    async fn query_rows(&mut self, sql: &str) -> Result<RowSet>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. A no-op when nothing is pending.
    async fn rollback(&mut self) -> Result<()>;

    /// Close the session.
    async fn close(self) -> Result<()>;
}

/// Write side of the migration.
#[async_trait]
pub trait TargetConnection: Send + Sized {
    /// Engine name used in log lines.
    fn name(&self) -> &str;

    /// Execute one parameterized statement. Placeholders are `@P1`, `@P2`, ...
    /// bound positionally from `params`. Returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute a raw SQL batch as sent by a script, without parameters.
    async fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Run a query returning a single integer (e.g. `SELECT COUNT(*)`).
    async fn query_scalar(&mut self, sql: &str) -> Result<i64>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. A no-op when nothing is pending.
    async fn rollback(&mut self) -> Result<()>;

    /// Close the session.
    async fn close(self) -> Result<()>;
}
