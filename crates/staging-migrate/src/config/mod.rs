//! Configuration loading and validation.
//!
//! Settings come from an optional YAML file overlaid with `MIGRATE_*`
//! environment variables. Required values are checked once, up front, by
//! [`Config::validate`].

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Environment variables recognised by [`Config::apply_env`].
pub mod env {
    pub const SOURCE_HOST: &str = "MIGRATE_SOURCE_HOST";
    pub const SOURCE_PORT: &str = "MIGRATE_SOURCE_PORT";
    pub const SOURCE_USER: &str = "MIGRATE_SOURCE_USER";
    pub const SOURCE_PASSWORD: &str = "MIGRATE_SOURCE_PASSWORD";
    pub const SOURCE_DATABASE: &str = "MIGRATE_SOURCE_DATABASE";
    pub const TARGET_DRIVER: &str = "MIGRATE_TARGET_DRIVER";
    pub const TARGET_SERVER: &str = "MIGRATE_TARGET_SERVER";
    pub const TARGET_DATABASE: &str = "MIGRATE_TARGET_DATABASE";
    pub const TARGET_AUTH: &str = "MIGRATE_TARGET_AUTH";
    pub const TARGET_USER: &str = "MIGRATE_TARGET_USER";
    pub const TARGET_PASSWORD: &str = "MIGRATE_TARGET_PASSWORD";
    pub const TARGET_ENCRYPT: &str = "MIGRATE_TARGET_ENCRYPT";
    pub const TARGET_TRUST_SERVER_CERT: &str = "MIGRATE_TARGET_TRUST_SERVER_CERT";
    pub const SCRIPT_DIR: &str = "MIGRATE_SCRIPT_DIR";
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string. Does not validate, since
    /// environment overrides may still supply required values. Malformed or
    /// mistyped settings are configuration errors.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| MigrateError::Config(format!("invalid configuration: {}", e)))
    }

    /// Resolve the effective configuration: the optional YAML file, then the
    /// process environment on top, then validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(env::SOURCE_HOST) {
            self.source.host = v;
        }
        if let Some(v) = get(env::SOURCE_PORT) {
            self.source.port = v.trim().parse().map_err(|_| {
                MigrateError::Config(format!(
                    "{} must be a port number, got '{}'",
                    env::SOURCE_PORT,
                    v
                ))
            })?;
        }
        if let Some(v) = get(env::SOURCE_USER) {
            self.source.user = v;
        }
        if let Some(v) = get(env::SOURCE_PASSWORD) {
            self.source.password = v;
        }
        if let Some(v) = get(env::SOURCE_DATABASE) {
            self.source.database = v;
        }

        if let Some(v) = get(env::TARGET_DRIVER) {
            self.target.driver = Some(v);
        }
        if let Some(v) = get(env::TARGET_SERVER) {
            self.target.server = v;
        }
        if let Some(v) = get(env::TARGET_DATABASE) {
            self.target.database = v;
        }
        if let Some(v) = get(env::TARGET_AUTH) {
            self.target.auth = v
                .parse()
                .map_err(|e| MigrateError::Config(format!("{}: {}", env::TARGET_AUTH, e)))?;
        }
        if let Some(v) = get(env::TARGET_USER) {
            self.target.user = v;
        }
        if let Some(v) = get(env::TARGET_PASSWORD) {
            self.target.password = v;
        }
        if let Some(v) = get(env::TARGET_ENCRYPT) {
            self.target.encrypt = parse_bool(env::TARGET_ENCRYPT, &v)?;
        }
        if let Some(v) = get(env::TARGET_TRUST_SERVER_CERT) {
            self.target.trust_server_cert = parse_bool(env::TARGET_TRUST_SERVER_CERT, &v)?;
        }

        if let Some(v) = get(env::SCRIPT_DIR) {
            self.migration.script_dir = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Copy of the configuration with both passwords masked.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        for password in [&mut redacted.source.password, &mut redacted.target.password] {
            if !password.is_empty() {
                *password = "[REDACTED]".to_string();
            }
        }
        redacted
    }

    /// YAML rendering of [`Config::redacted`].
    pub fn to_redacted_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.redacted())?)
    }

    /// Compute a SHA256 fingerprint of the configuration (passwords excluded).
    pub fn hash(&self) -> String {
        let mut redacted = self.clone();
        redacted.source.password.clear();
        redacted.target.password.clear();
        let yaml = serde_yaml::to_string(&redacted).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(MigrateError::Config(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}

/// Target server address split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    pub instance: Option<String>,
}

impl TargetConfig {
    /// Parse `server` as `host`, `host,port`, `host\instance` or
    /// `host\instance,port`. A `tcp:` prefix is accepted.
    pub fn server_address(&self) -> Result<ServerAddress> {
        let raw = self.server.trim();
        let raw = raw.strip_prefix("tcp:").unwrap_or(raw);

        let (host_part, port) = match raw.split_once(',') {
            Some((h, p)) => {
                let port = p.trim().parse::<u16>().map_err(|_| {
                    MigrateError::Config(format!("target.server has an invalid port: '{}'", p))
                })?;
                (h.trim(), Some(port))
            }
            None => (raw, None),
        };

        let (host, instance) = match host_part.split_once('\\') {
            Some((h, i)) if !i.is_empty() => (h, Some(i.to_string())),
            Some((h, _)) => (h, None),
            None => (host_part, None),
        };

        if host.is_empty() {
            return Err(MigrateError::Config("target.server has no host".into()));
        }

        // "." and "(local)" are the usual shorthands for the local machine.
        let host = match host {
            "." | "(local)" => "localhost",
            h => h,
        };

        Ok(ServerAddress {
            host: host.to_string(),
            port,
            instance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (env::SOURCE_HOST, "maria.internal"),
            (env::SOURCE_USER, "etl"),
            (env::SOURCE_PASSWORD, "secret"),
            (env::SOURCE_DATABASE, "customer"),
            (env::TARGET_DRIVER, "ODBC Driver 18 for SQL Server"),
            (env::TARGET_SERVER, "sql01,1444"),
            (env::TARGET_DATABASE, "Northwind"),
            (env::TARGET_AUTH, "sql_server"),
            (env::TARGET_USER, "loader"),
            (env::TARGET_PASSWORD, "secret"),
        ]
    }

    #[test]
    fn test_target_auth_defaults_to_integrated() {
        assert_eq!(Config::default().target.auth, TargetAuth::Integrated);
        assert_eq!("trusted".parse::<TargetAuth>(), Ok(TargetAuth::Integrated));
        assert_eq!("SQL_SERVER".parse::<TargetAuth>(), Ok(TargetAuth::SqlServer));
        assert!("ldap".parse::<TargetAuth>().is_err());
    }

    #[test]
    fn test_env_builds_complete_config() {
        let mut config = Config::default();
        config.apply_env(lookup(&full_env())).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.host, "maria.internal");
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.target.database, "Northwind");
        assert_eq!(config.target.auth, TargetAuth::SqlServer);
        assert_eq!(
            config.target.driver.as_deref(),
            Some("ODBC Driver 18 for SQL Server")
        );
        assert_eq!(config.migration.tables, DEFAULT_TABLES.to_vec());
    }

    #[test]
    fn test_missing_env_key_is_reported_by_name() {
        let vars: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != env::SOURCE_PASSWORD)
            .collect();
        let mut config = Config::default();
        config.apply_env(lookup(&vars)).unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(err.to_string().contains(env::SOURCE_PASSWORD));
    }

    #[test]
    fn test_empty_env_value_counts_as_missing() {
        let mut vars = full_env();
        vars.retain(|(k, _)| *k != env::TARGET_SERVER);
        vars.push((env::TARGET_SERVER, "   "));
        let mut config = Config::default();
        config.apply_env(lookup(&vars)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_port_fails_fast() {
        let mut vars = full_env();
        vars.push((env::SOURCE_PORT, "not-a-port"));
        let mut config = Config::default();
        let err = config.apply_env(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains(env::SOURCE_PORT));
    }

    #[test]
    fn test_env_overrides_yaml() {
        let yaml = r#"
source:
  host: from-file
  database: customer
  user: etl
  password: pw
target:
  server: sql01
  database: Northwind
  auth: sql_server
  user: loader
  password: pw
migration:
  tables: [Items]
  rows_per_insert: 50
"#;
        let mut config = Config::from_yaml(yaml).unwrap();
        config
            .apply_env(lookup(&[(env::SOURCE_HOST, "from-env")]))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.host, "from-env");
        assert_eq!(config.migration.tables, vec!["Items".to_string()]);
        assert_eq!(config.migration.rows_per_insert, 50);
        assert_eq!(config.migration.batch_separator, "GO");
    }

    #[test]
    fn test_out_of_range_port_in_yaml_is_config_error() {
        let err = Config::from_yaml("source:\n  port: 70000\n").unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
        assert!(err.to_string().contains("source.port") || err.to_string().contains("u16"));
    }

    #[test]
    fn test_malformed_yaml_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"source: [not: a: mapping\n").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.starts_with("invalid configuration")));
    }

    #[test]
    fn test_server_address_forms() {
        let mut target = TargetConfig {
            server: "sql01".into(),
            ..Default::default()
        };
        assert_eq!(
            target.server_address().unwrap(),
            ServerAddress {
                host: "sql01".into(),
                port: None,
                instance: None
            }
        );

        target.server = "tcp:sql01,1444".into();
        assert_eq!(target.server_address().unwrap().port, Some(1444));

        target.server = r"sql01\SQLEXPRESS".into();
        let addr = target.server_address().unwrap();
        assert_eq!(addr.host, "sql01");
        assert_eq!(addr.instance.as_deref(), Some("SQLEXPRESS"));

        target.server = ".".into();
        assert_eq!(target.server_address().unwrap().host, "localhost");

        target.server = "sql01,abc".into();
        assert!(target.server_address().is_err());
    }

    #[test]
    fn test_redacted_yaml_hides_passwords() {
        let mut config = Config::default();
        config.apply_env(lookup(&full_env())).unwrap();
        let yaml = config.to_redacted_yaml().unwrap();
        assert!(!yaml.contains(&config.source.password));
        assert!(!yaml.contains(&config.target.password));
        assert!(yaml.contains("[REDACTED]"));
        assert!(yaml.contains(&config.source.host));
    }

    #[test]
    fn test_hash_ignores_passwords() {
        let mut a = Config::default();
        a.apply_env(lookup(&full_env())).unwrap();
        let mut b = a.clone();
        b.source.password = "different".into();
        assert_eq!(a.hash(), b.hash());

        b.source.host = "elsewhere".into();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_resolve_script_uses_script_dir() {
        let mut migration = MigrationConfig::default();
        assert_eq!(
            migration.resolve_script(&migration.ddl_script.clone()),
            PathBuf::from("2 - Migration DDL.sql")
        );

        migration.script_dir = Some(PathBuf::from("/srv/scripts"));
        assert_eq!(
            migration.resolve_script(Path::new("ddl.sql")),
            PathBuf::from("/srv/scripts/ddl.sql")
        );
        assert_eq!(
            migration.resolve_script(Path::new("/abs/ddl.sql")),
            PathBuf::from("/abs/ddl.sql")
        );
    }
}
