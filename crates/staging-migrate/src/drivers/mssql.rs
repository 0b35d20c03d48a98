//! SQL Server target connection.
//!
//! One Tiberius client over TCP. The session runs with
//! `IMPLICIT_TRANSACTIONS ON`, so the first statement after connect, commit or
//! rollback opens a transaction that stays open until the next explicit
//! COMMIT/ROLLBACK.

use std::time::Duration;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, SqlBrowser, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::config::{TargetAuth, TargetConfig};
use crate::core::traits::TargetConnection;
use crate::core::value::{SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

const APPLICATION_NAME: &str = "staging-migrate";

/// SQL Server target connection.
pub struct MssqlTarget {
    client: Client<Compat<TcpStream>>,
}

impl MssqlTarget {
    /// Connect, switch the session to implicit transactions and probe it.
    pub async fn connect(target: &TargetConfig) -> Result<Self> {
        let config = build_config(target)?;

        let tcp = if config_has_instance(target)? {
            TcpStream::connect_named(&config).await
        } else {
            TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| tiberius::error::Error::Io {
                    kind: e.kind(),
                    message: e.to_string(),
                })
        }
        .map_err(|e| MigrateError::connection("target", e))?;

        tcp.set_nodelay(true).ok();
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket2::SockRef::from(&tcp).set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on SQL Server connection: {}", e);
        }

        let mut client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MigrateError::connection("target", e))?;

        client
            .simple_query("SET IMPLICIT_TRANSACTIONS ON")
            .await
            .map_err(|e| MigrateError::connection("target", e))?
            .into_results()
            .await
            .map_err(|e| MigrateError::connection("target", e))?;

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("target", e))?
            .into_row()
            .await
            .map_err(|e| MigrateError::connection("target", e))?;

        info!(
            "Connected to SQL Server target: {}/{} (auth: {:?}{})",
            target.server,
            target.database,
            target.auth,
            target
                .driver
                .as_deref()
                .map(|d| format!(", configured driver: {}", d))
                .unwrap_or_default()
        );

        Ok(Self { client })
    }
}

fn config_has_instance(target: &TargetConfig) -> Result<bool> {
    let addr = target.server_address()?;
    Ok(addr.instance.is_some() && addr.port.is_none())
}

/// Build the Tiberius configuration from the target settings.
fn build_config(target: &TargetConfig) -> Result<Config> {
    let addr = target.server_address()?;

    let mut config = Config::new();
    config.host(&addr.host);
    if let Some(port) = addr.port {
        config.port(port);
    }
    if let Some(instance) = &addr.instance {
        config.instance_name(instance);
    }
    config.database(&target.database);
    config.application_name(APPLICATION_NAME);

    match target.auth {
        TargetAuth::SqlServer => {
            config.authentication(AuthMethod::sql_server(&target.user, &target.password));
        }
        #[cfg(feature = "integrated-auth")]
        TargetAuth::Integrated => {
            config.authentication(AuthMethod::Integrated);
        }
        #[cfg(not(feature = "integrated-auth"))]
        TargetAuth::Integrated => {
            return Err(MigrateError::Config(
                "integrated authentication requires the `integrated-auth` feature".into(),
            ));
        }
    }

    if target.encrypt {
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }
    if target.trust_server_cert {
        config.trust_cert();
    }

    Ok(config)
}

/// Box a value as a Tiberius parameter. NULLs keep their type so the server
/// does not have to guess the parameter type.
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Bool => Box::new(Option::<bool>::None),
            SqlNullType::I16 => Box::new(Option::<i16>::None),
            SqlNullType::I32 => Box::new(Option::<i32>::None),
            SqlNullType::I64 => Box::new(Option::<i64>::None),
            SqlNullType::F32 => Box::new(Option::<f32>::None),
            SqlNullType::F64 => Box::new(Option::<f64>::None),
            SqlNullType::String => Box::new(Option::<String>::None),
            SqlNullType::Bytes => Box::new(Option::<Vec<u8>>::None),
            SqlNullType::Uuid => Box::new(Option::<uuid::Uuid>::None),
            SqlNullType::Decimal => Box::new(Option::<rust_decimal::Decimal>::None),
            SqlNullType::DateTime => Box::new(Option::<chrono::NaiveDateTime>::None),
            SqlNullType::DateTimeOffset => {
                Box::new(Option::<chrono::DateTime<chrono::FixedOffset>>::None)
            }
            SqlNullType::Date => Box::new(Option::<chrono::NaiveDate>::None),
            SqlNullType::Time => Box::new(Option::<chrono::NaiveTime>::None),
        },
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

#[async_trait]
impl TargetConnection for MssqlTarget {
    fn name(&self) -> &str {
        "mssql"
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let boxed: Vec<Box<dyn ToSql>> = params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

        let result = self.client.execute(sql, &param_refs).await?;
        Ok(result.total())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn query_scalar(&mut self, sql: &str) -> Result<i64> {
        let row = self.client.simple_query(sql).await?.into_row().await?;
        let cell = row.and_then(|r| r.into_iter().next());
        match cell {
            Some(ColumnData::I64(Some(v))) => Ok(v),
            Some(ColumnData::I32(Some(v))) => Ok(v as i64),
            Some(ColumnData::I16(Some(v))) => Ok(v as i64),
            Some(ColumnData::U8(Some(v))) => Ok(v as i64),
            other => Err(MigrateError::Target(tiberius::error::Error::Conversion(
                format!("expected an integer scalar from '{}', got {:?}", sql, other).into(),
            ))),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        debug!("Committing SQL Server transaction");
        self.execute_batch("IF @@TRANCOUNT > 0 COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        debug!("Rolling back SQL Server transaction");
        self.execute_batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}
