//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Tables migrated when the configuration does not name any, in load order.
pub const DEFAULT_TABLES: [&str; 5] = ["Locations", "Batches", "Entities", "Items", "Transactions"];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL/MariaDB).
    #[serde(default)]
    pub source: SourceConfig,

    /// Target database configuration (SQL Server).
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL/MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mysql_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// How the target connection authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAuth {
    /// The caller's ambient Windows/Kerberos identity (trusted connection).
    #[default]
    Integrated,

    /// SQL Server login with user and password.
    SqlServer,
}

impl std::str::FromStr for TargetAuth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integrated" | "trusted" | "kerberos" => Ok(TargetAuth::Integrated),
            "sql_server" | "sqlserver" | "sql" => Ok(TargetAuth::SqlServer),
            other => Err(format!(
                "unknown auth method '{}', expected 'integrated' or 'sql_server'",
                other
            )),
        }
    }
}

/// Target database (SQL Server) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// ODBC driver name, kept for configuration compatibility. The TDS client
    /// connects directly and only reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    /// Server as `host`, `host,port` or `host\instance`.
    #[serde(default)]
    pub server: String,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Authentication method (default: integrated).
    #[serde(default)]
    pub auth: TargetAuth,

    /// Username for `sql_server` auth.
    #[serde(default)]
    pub user: String,

    /// Password for `sql_server` auth.
    #[serde(default)]
    pub password: String,

    /// Encrypt the connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            driver: None,
            server: String::new(),
            database: String::new(),
            auth: TargetAuth::default(),
            user: String::new(),
            password: String::new(),
            encrypt: true,
            trust_server_cert: false,
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("driver", &self.driver)
            .field("server", &self.server)
            .field("database", &self.database)
            .field("auth", &self.auth)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source tables to stage, in load order.
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,

    /// Schema holding the staging tables (default: "Migration").
    #[serde(default = "default_staging_schema")]
    pub staging_schema: String,

    /// Staging table name prefix (default: "Stage_").
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,

    /// Directory the script paths are resolved against (default: current dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<PathBuf>,

    /// Script that creates the staging structures.
    #[serde(default = "default_ddl_script")]
    pub ddl_script: PathBuf,

    /// Script that marks staged rows valid or invalid.
    #[serde(default = "default_validation_script")]
    pub validation_script: PathBuf,

    /// Script that moves valid staged rows into the final tables.
    #[serde(default = "default_transformation_script")]
    pub transformation_script: PathBuf,

    /// Batch separator token (default: "GO").
    #[serde(default = "default_batch_separator")]
    pub batch_separator: String,

    /// Rows per INSERT statement (default: 1, row-at-a-time).
    #[serde(default = "default_rows_per_insert")]
    pub rows_per_insert: usize,

    /// Compare the staging row count with the extracted count after each load.
    #[serde(default)]
    pub verify_row_counts: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tables: default_tables(),
            staging_schema: default_staging_schema(),
            staging_prefix: default_staging_prefix(),
            script_dir: None,
            ddl_script: default_ddl_script(),
            validation_script: default_validation_script(),
            transformation_script: default_transformation_script(),
            batch_separator: default_batch_separator(),
            rows_per_insert: default_rows_per_insert(),
            verify_row_counts: false,
        }
    }
}

impl MigrationConfig {
    /// Resolve a script path against `script_dir`.
    pub fn resolve_script(&self, path: &std::path::Path) -> PathBuf {
        match &self.script_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_true() -> bool {
    true
}

fn default_tables() -> Vec<String> {
    DEFAULT_TABLES.iter().map(|t| t.to_string()).collect()
}

fn default_staging_schema() -> String {
    "Migration".to_string()
}

fn default_staging_prefix() -> String {
    "Stage_".to_string()
}

fn default_ddl_script() -> PathBuf {
    PathBuf::from("2 - Migration DDL.sql")
}

fn default_validation_script() -> PathBuf {
    PathBuf::from("2 - Validation Alliant Migration.sql")
}

fn default_transformation_script() -> PathBuf {
    PathBuf::from("2 - Transformation Alliant.sql")
}

fn default_batch_separator() -> String {
    "GO".to_string()
}

fn default_rows_per_insert() -> usize {
    1
}
