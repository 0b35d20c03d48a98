//! Extraction from the source and loading into staging tables.
//!
//! A table moves in two steps: [`extract_table`] reads the whole source table
//! into a [`TableSnapshot`], then [`load_table`] writes it into
//! `[<staging_schema>].[<prefix><table>]` with identity override enabled.
//! Nothing is committed here; both connections stay inside the run's
//! transaction.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::core::{quote_mssql_ident, SourceConnection, SqlValue, TableSnapshot, TargetConnection};
use crate::error::{MigrateError, Result};

/// SQL Server accepts at most 2100 parameters per statement.
const MAX_PARAMS_PER_STATEMENT: usize = 2100;

/// SQL Server accepts at most 1000 row value expressions per `VALUES` clause.
const MAX_ROWS_PER_VALUES: usize = 1000;

/// How snapshots are written into the staging schema.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub staging_schema: String,
    pub staging_prefix: String,
    /// Rows per INSERT statement. 1 inserts row by row.
    pub rows_per_insert: usize,
    /// Compare `COUNT(*)` of the staging table with the snapshot length.
    pub verify_row_counts: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&MigrationConfig::default())
    }
}

impl From<&MigrationConfig> for LoadOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            staging_schema: config.staging_schema.clone(),
            staging_prefix: config.staging_prefix.clone(),
            rows_per_insert: config.rows_per_insert,
            verify_row_counts: config.verify_row_counts,
        }
    }
}

impl LoadOptions {
    /// Schema-qualified, quoted staging table name for a source table.
    pub fn staging_table(&self, table: &str) -> String {
        format!(
            "{}.{}",
            quote_mssql_ident(&self.staging_schema),
            quote_mssql_ident(&format!("{}{}", self.staging_prefix, table))
        )
    }

    /// Rows that fit in one INSERT for the given column count.
    fn rows_per_statement(&self, columns: usize) -> usize {
        let by_params = if columns > 0 {
            (MAX_PARAMS_PER_STATEMENT / columns).max(1)
        } else {
            1
        };
        self.rows_per_insert
            .max(1)
            .min(by_params)
            .min(MAX_ROWS_PER_VALUES)
    }
}

/// Row counts for one staged table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableResult {
    pub table: String,
    pub rows_extracted: usize,
    pub rows_inserted: u64,
}

/// Read every row of `table` from the source, in source order.
pub async fn extract_table<S: SourceConnection>(source: &mut S, table: &str) -> Result<TableSnapshot> {
    let sql = format!("SELECT * FROM {}", source.quote_ident(table));
    debug!("Extracting {} from {}: {}", table, source.name(), sql);

    let (columns, rows) = source
        .query_rows(&sql)
        .await
        .map_err(|e| MigrateError::extraction(table, e))?;

    let snapshot = TableSnapshot::new(table, columns, rows);
    info!("Extracted {} rows from source table {}", snapshot.len(), table);
    Ok(snapshot)
}

/// Write a snapshot into its staging table.
///
/// Runs `SET IDENTITY_INSERT ... ON`, the inserts in snapshot order, then
/// `SET IDENTITY_INSERT ... OFF`, even for an empty snapshot. Any failure
/// rolls back the target before the error is returned.
pub async fn load_table<T: TargetConnection>(
    target: &mut T,
    snapshot: &TableSnapshot,
    options: &LoadOptions,
) -> Result<u64> {
    let staging = options.staging_table(&snapshot.table);

    match insert_snapshot(target, snapshot, &staging, options).await {
        Ok(inserted) => {
            info!("Inserted {} rows into staging table {}", inserted, staging);
            Ok(inserted)
        }
        Err(message) => {
            if let Err(e) = target.rollback().await {
                warn!("Rollback after failed load of {} also failed: {}", staging, e);
            }
            Err(MigrateError::insertion(&snapshot.table, message))
        }
    }
}

async fn insert_snapshot<T: TargetConnection>(
    target: &mut T,
    snapshot: &TableSnapshot,
    staging: &str,
    options: &LoadOptions,
) -> std::result::Result<u64, String> {
    if !snapshot.is_rectangular() {
        return Err(format!(
            "snapshot rows do not match its {} columns",
            snapshot.columns.len()
        ));
    }

    target
        .execute_batch(&format!("SET IDENTITY_INSERT {} ON", staging))
        .await
        .map_err(|e| format!("enabling identity insert: {}", e))?;

    let mut inserted = 0u64;
    if !snapshot.is_empty() {
        let col_str = snapshot
            .columns
            .iter()
            .map(|c| quote_mssql_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let cols_per_row = snapshot.columns.len();
        let batch_rows = options.rows_per_statement(cols_per_row);

        for (i, batch) in snapshot.rows.chunks(batch_rows).enumerate() {
            let sql = build_insert(staging, &col_str, cols_per_row, batch.len());
            let params: Vec<SqlValue> = batch.iter().flatten().cloned().collect();

            target.execute(&sql, &params).await.map_err(|e| {
                let first_row = i * batch_rows + 1;
                if batch.len() == 1 {
                    format!("row {}: {}", first_row, e)
                } else {
                    format!("rows {}-{}: {}", first_row, first_row + batch.len() - 1, e)
                }
            })?;
            inserted += batch.len() as u64;
        }
        debug!(
            "Inserted {} rows into {} ({} rows per statement)",
            inserted, staging, batch_rows
        );
    }

    target
        .execute_batch(&format!("SET IDENTITY_INSERT {} OFF", staging))
        .await
        .map_err(|e| format!("disabling identity insert: {}", e))?;

    if options.verify_row_counts {
        let count = target
            .query_scalar(&format!("SELECT COUNT(*) FROM {}", staging))
            .await
            .map_err(|e| format!("counting staged rows: {}", e))?;
        if count != snapshot.len() as i64 {
            return Err(format!(
                "row count mismatch: extracted {}, staging table holds {}",
                snapshot.len(),
                count
            ));
        }
    }

    Ok(inserted)
}

/// `INSERT INTO t (cols) VALUES (@P1, ..), (..)` for `rows` rows.
fn build_insert(staging: &str, col_str: &str, cols_per_row: usize, rows: usize) -> String {
    let value_groups: Vec<String> = (0..rows)
        .map(|row| {
            let placeholders: Vec<String> = (1..=cols_per_row)
                .map(|col| format!("@P{}", row * cols_per_row + col))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        staging,
        col_str,
        value_groups.join(", ")
    )
}

/// Extract one table and load it into staging.
pub async fn stage_table<S: SourceConnection, T: TargetConnection>(
    source: &mut S,
    target: &mut T,
    table: &str,
    options: &LoadOptions,
) -> Result<TableResult> {
    let snapshot = extract_table(source, table).await?;
    let rows_inserted = load_table(target, &snapshot, options).await?;
    Ok(TableResult {
        table: table.to_string(),
        rows_extracted: snapshot.len(),
        rows_inserted,
    })
}
