//! In-memory connections for unit tests.
//!
//! The fakes share their state through `Arc<Mutex<_>>` so a test can keep a
//! handle and inspect what happened after the connection was moved into (and
//! closed by) the code under test.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::quote_mysql_ident;
use crate::core::traits::{RowSet, SourceConnection, TargetConnection};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

fn target_err(msg: &str) -> MigrateError {
    MigrateError::Target(tiberius::error::Error::Protocol(msg.to_string().into()))
}

fn source_err(msg: &str) -> MigrateError {
    MigrateError::Source(sqlx::Error::Protocol(msg.to_string()))
}

// ----------------------------------------------------------------------------
// Source
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SourceState {
    pub tables: HashMap<String, RowSet>,
    pub queries: Vec<String>,
    pub fail_on_table: Option<String>,
    pub fail_commit: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct FakeSource {
    pub state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        self.state().tables.insert(
            name.to_string(),
            (columns.iter().map(|c| c.to_string()).collect(), rows),
        );
        self
    }

    pub fn state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl SourceConnection for FakeSource {
    fn name(&self) -> &str {
        "fake-source"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql_ident(name)
    }

    async fn query_rows(&mut self, sql: &str) -> Result<RowSet> {
        let mut state = self.state();
        state.queries.push(sql.to_string());

        let table = sql
            .trim_start_matches("SELECT * FROM ")
            .trim_matches('`')
            .to_string();
        if state.fail_on_table.as_deref() == Some(table.as_str()) {
            return Err(source_err("lost connection to MySQL server during query"));
        }
        state
            .tables
            .get(&table)
            .cloned()
            .ok_or_else(|| source_err(&format!("Table '{}' doesn't exist", table)))
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.fail_commit {
            return Err(source_err("commit failed"));
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state().rollbacks += 1;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.state().closes += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Target
// ----------------------------------------------------------------------------

/// One staging insert recorded by the fake target.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertedRows {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub identity_override: bool,
}

#[derive(Debug, Default)]
pub struct TargetState {
    /// Every statement in execution order, committed or not.
    pub statements: Vec<String>,
    /// Statements of the open transaction.
    pub pending: Vec<String>,
    /// Statements that survived a commit.
    pub committed: Vec<String>,
    pub pending_inserts: Vec<InsertedRows>,
    pub committed_inserts: Vec<InsertedRows>,
    pub identity_on: HashSet<String>,
    /// Fail any statement containing this text.
    pub fail_on: Option<String>,
    pub fail_commit: bool,
    pub fail_close: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    /// Value returned by `query_scalar`; `None` counts committed + pending rows.
    pub scalar_override: Option<i64>,
}

impl TargetState {
    /// Committed rows for a qualified staging table.
    pub fn committed_rows(&self, table: &str) -> usize {
        self.committed_inserts
            .iter()
            .filter(|i| i.table == table)
            .map(|i| i.rows.len())
            .sum()
    }

    /// Committed and pending rows for a qualified staging table.
    pub fn visible_rows(&self, table: &str) -> usize {
        self.committed_rows(table)
            + self
                .pending_inserts
                .iter()
                .filter(|i| i.table == table)
                .map(|i| i.rows.len())
                .sum::<usize>()
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        match &self.fail_on {
            Some(needle) if sql.contains(needle.as_str()) => {
                Err(target_err(&format!("statement failed: {}", sql)))
            }
            _ => Ok(()),
        }
    }

    fn record(&mut self, sql: &str) {
        self.statements.push(sql.to_string());
        self.pending.push(sql.to_string());
    }
}

#[derive(Clone, Default)]
pub struct FakeTarget {
    pub state: Arc<Mutex<TargetState>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: &str) -> Self {
        let target = Self::default();
        target.state().fail_on = Some(needle.to_string());
        target
    }

    pub fn state(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap()
    }
}

/// Parse `INSERT INTO <table> (<cols>) VALUES ...`.
fn parse_insert(sql: &str) -> Option<(String, Vec<String>)> {
    let rest = sql.strip_prefix("INSERT INTO ")?;
    let (table, rest) = rest.split_once(" (")?;
    let (cols, _) = rest.split_once(") VALUES ")?;
    let columns = cols
        .split(", ")
        .map(|c| c.trim_matches(|ch| ch == '[' || ch == ']').to_string())
        .collect();
    Some((table.to_string(), columns))
}

#[async_trait]
impl TargetConnection for FakeTarget {
    fn name(&self) -> &str {
        "fake-target"
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut state = self.state();
        state.check_failure(sql)?;
        state.record(sql);

        if let Some((table, columns)) = parse_insert(sql) {
            let rows: Vec<Vec<SqlValue>> = params
                .chunks(columns.len().max(1))
                .map(|c| c.to_vec())
                .collect();
            let count = rows.len() as u64;
            let identity_override = state.identity_on.contains(&table);
            state.pending_inserts.push(InsertedRows {
                table,
                columns,
                rows,
                identity_override,
            });
            return Ok(count);
        }
        Ok(0)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        let mut state = self.state();
        state.check_failure(sql)?;
        state.record(sql);

        if let Some(rest) = sql.strip_prefix("SET IDENTITY_INSERT ") {
            if let Some(table) = rest.strip_suffix(" ON") {
                state.identity_on.insert(table.to_string());
            } else if let Some(table) = rest.strip_suffix(" OFF") {
                state.identity_on.remove(table);
            }
        }
        Ok(())
    }

    async fn query_scalar(&mut self, sql: &str) -> Result<i64> {
        let mut state = self.state();
        state.check_failure(sql)?;
        state.statements.push(sql.to_string());
        if let Some(v) = state.scalar_override {
            return Ok(v);
        }
        let table = sql
            .trim_start_matches("SELECT COUNT(*) FROM ")
            .to_string();
        Ok(state.visible_rows(&table) as i64)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.fail_commit {
            return Err(target_err("commit failed"));
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        let inserts = std::mem::take(&mut state.pending_inserts);
        state.committed_inserts.extend(inserts);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.state();
        state.pending.clear();
        state.pending_inserts.clear();
        state.rollbacks += 1;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        let mut state = self.state();
        state.closes += 1;
        if state.fail_close {
            return Err(target_err("connection reset while closing"));
        }
        Ok(())
    }
}
