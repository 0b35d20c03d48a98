//! MySQL/MariaDB source connection.
//!
//! Uses a single SQLx connection with `autocommit` switched off, so every
//! statement runs inside a transaction that ends with an explicit COMMIT or
//! ROLLBACK.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::traits::{RowSet, SourceConnection};
use crate::core::value::{SqlNullType, SqlValue};
use crate::core::quote_mysql_ident;
use crate::error::{MigrateError, Result};

/// MySQL/MariaDB source connection.
pub struct MysqlSource {
    conn: MySqlConnection,
}

impl MysqlSource {
    /// Connect, disable auto-commit and probe the session.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| MigrateError::connection("source", e))?;

        conn.execute("SET autocommit = 0")
            .await
            .map_err(|e| MigrateError::connection("source", format!("disabling autocommit: {}", e)))?;

        sqlx::query("SELECT 1")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| MigrateError::connection("source", format!("testing connection: {}", e)))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { conn })
    }

    /// Convert a MySQL row to positional values.
    fn row_to_values(row: &MySqlRow) -> std::result::Result<Vec<SqlValue>, sqlx::Error> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let data_type = col.type_info().name().to_lowercase();
                decode_value(row, i, &data_type)
            })
            .collect()
    }
}

/// Decode one column by its MySQL type name.
fn decode_value(
    row: &MySqlRow,
    i: usize,
    data_type: &str,
) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(i)?.is_null() {
        return Ok(SqlValue::Null(null_type_for(data_type)));
    }

    let value = match data_type {
        // Integer types
        "boolean" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
        "tinyint" => SqlValue::I16(row.try_get::<i8, _>(i)? as i16),
        "smallint" => SqlValue::I16(row.try_get::<i16, _>(i)?),
        "mediumint" | "int" => SqlValue::I32(row.try_get::<i32, _>(i)?),
        "bigint" => SqlValue::I64(row.try_get::<i64, _>(i)?),
        "tinyint unsigned" => SqlValue::I16(row.try_get::<u8, _>(i)? as i16),
        "smallint unsigned" => SqlValue::I32(row.try_get::<u16, _>(i)? as i32),
        "mediumint unsigned" | "int unsigned" => SqlValue::I64(row.try_get::<u32, _>(i)? as i64),
        "bigint unsigned" => {
            let v = row.try_get::<u64, _>(i)?;
            match i64::try_from(v) {
                Ok(v) => SqlValue::I64(v),
                Err(_) => SqlValue::Decimal(Decimal::from(v)),
            }
        }
        "year" => SqlValue::I32(row.try_get_unchecked::<u16, _>(i)? as i32),
        "bit" => match row.try_get::<bool, _>(i) {
            Ok(b) => SqlValue::Bool(b),
            Err(_) => SqlValue::I64(row.try_get_unchecked::<u64, _>(i)? as i64),
        },

        // Floating point
        "float" => SqlValue::F32(row.try_get::<f32, _>(i)?),
        "double" => SqlValue::F64(row.try_get::<f64, _>(i)?),

        // Decimal
        "decimal" => SqlValue::Decimal(row.try_get::<Decimal, _>(i)?),

        // Binary types
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "geometry" => {
            SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?)
        }

        // Date/Time types
        "date" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(i)?),
        "time" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(i)?),
        "datetime" | "timestamp" => SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(i)?),

        // char, varchar, text variants, enum, set, json
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
    };

    Ok(value)
}

/// Get the appropriate null type for a MySQL data type.
fn null_type_for(data_type: &str) -> SqlNullType {
    match data_type {
        "boolean" => SqlNullType::Bool,
        "tinyint" | "smallint" | "tinyint unsigned" => SqlNullType::I16,
        "mediumint" | "int" | "smallint unsigned" | "year" => SqlNullType::I32,
        "bigint" | "mediumint unsigned" | "int unsigned" | "bit" => SqlNullType::I64,
        "bigint unsigned" => SqlNullType::I64,
        "float" => SqlNullType::F32,
        "double" => SqlNullType::F64,
        "decimal" => SqlNullType::Decimal,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "geometry" => {
            SqlNullType::Bytes
        }
        "date" => SqlNullType::Date,
        "time" => SqlNullType::Time,
        "datetime" | "timestamp" => SqlNullType::DateTime,
        _ => SqlNullType::String,
    }
}

#[async_trait]
impl SourceConnection for MysqlSource {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql_ident(name)
    }

    async fn query_rows(&mut self, sql: &str) -> Result<RowSet> {
        debug!("MySQL query: {}", sql);
        // Column names come from the statement so empty results keep them.
        let statement = self.conn.prepare(sql).await?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows: Vec<MySqlRow> = statement.query().fetch_all(&mut self.conn).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            values.push(Self::row_to_values(row)?);
        }

        Ok((columns, values))
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_types_follow_decoded_types() {
        assert_eq!(null_type_for("int"), SqlNullType::I32);
        assert_eq!(null_type_for("int unsigned"), SqlNullType::I64);
        assert_eq!(null_type_for("tinyint unsigned"), SqlNullType::I16);
        assert_eq!(null_type_for("decimal"), SqlNullType::Decimal);
        assert_eq!(null_type_for("longblob"), SqlNullType::Bytes);
        assert_eq!(null_type_for("timestamp"), SqlNullType::DateTime);
        assert_eq!(null_type_for("varchar"), SqlNullType::String);
        assert_eq!(null_type_for("json"), SqlNullType::String);
    }

    /// Local MySQL settings - update these to match your environment.
    fn get_test_config() -> SourceConfig {
        SourceConfig {
            host: "localhost".to_string(),
            port: 3306,
            database: "operations".to_string(),
            user: "root".to_string(),
            password: "MysqlPassword123".to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // Run with --ignored flag
    async fn test_empty_table_keeps_column_names() {
        let mut source = MysqlSource::connect(&get_test_config())
            .await
            .expect("Failed to connect");
        source
            .conn
            .execute("CREATE TEMPORARY TABLE empty_items (id INT, label VARCHAR(20))")
            .await
            .unwrap();

        let (columns, rows) = source.query_rows("SELECT * FROM `empty_items`").await.unwrap();
        assert_eq!(columns, vec!["id".to_string(), "label".to_string()]);
        assert!(rows.is_empty());

        source.rollback().await.unwrap();
        source.close().await.unwrap();
    }
}
