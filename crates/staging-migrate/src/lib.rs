//! # staging-migrate
//!
//! Copies operational tables from MySQL/MariaDB into SQL Server staging
//! tables and runs the server-side scripts that validate and transform them.
//!
//! A run works inside one transaction per database:
//!
//! - **Staging DDL** script prepares `[Migration].[Stage_*]`
//! - **Extract + load** copies every configured table with identity override
//! - **Validation** and **transformation** scripts run on the target
//! - **Commit** of the source, then the target, or rollback of both
//!
//! ## Authentication
//!
//! [`TargetAuth`] defaults to integrated (trusted) identity, which is only
//! accepted when the crate is built with the `integrated-auth` feature.
//! Default builds must select `sql_server` authentication (for example
//! `MIGRATE_TARGET_AUTH=sql_server`) or configuration validation fails.
//!
//! ## Example
//!
//! ```rust,no_run
//! use staging_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> staging_migrate::Result<()> {
//!     let config = Config::resolve(Some("config.yaml".as_ref()))?;
//!     let result = Orchestrator::new(config).run().await?;
//!     println!("Staged {} rows", result.rows_staged);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod script;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetAuth, TargetConfig};
pub use crate::core::{SourceConnection, SqlValue, TableSnapshot, TargetConnection};
pub use drivers::{MssqlTarget, MysqlSource};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, MigrationResult, Orchestrator, RunPhase};
pub use script::{run_script, split_batches, ScriptResult, ScriptSource};
pub use transfer::{extract_table, load_table, stage_table, LoadOptions, TableResult};
