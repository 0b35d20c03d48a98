//! Configuration validation.

use super::{env, Config, TargetAuth};
use crate::error::{MigrateError, Result};

/// SQL Server accepts at most 1000 row value expressions per INSERT.
pub const MAX_ROWS_PER_INSERT: usize = 1000;

fn required(value: &str, field: &str, var: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{} is required (set it in the config file or via {})",
            field, var
        )));
    }
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    required(&config.source.host, "source.host", env::SOURCE_HOST)?;
    required(&config.source.user, "source.user", env::SOURCE_USER)?;
    required(&config.source.password, "source.password", env::SOURCE_PASSWORD)?;
    required(&config.source.database, "source.database", env::SOURCE_DATABASE)?;
    if config.source.port == 0 {
        return Err(MigrateError::Config("source.port must not be 0".into()));
    }

    // Target validation
    required(&config.target.server, "target.server", env::TARGET_SERVER)?;
    required(&config.target.database, "target.database", env::TARGET_DATABASE)?;
    config.target.server_address()?;

    match config.target.auth {
        TargetAuth::SqlServer => {
            required(&config.target.user, "target.user", env::TARGET_USER)?;
            required(&config.target.password, "target.password", env::TARGET_PASSWORD)?;
        }
        TargetAuth::Integrated => {
            if !cfg!(feature = "integrated-auth") {
                return Err(MigrateError::Config(
                    "target.auth 'integrated' requires a build with the `integrated-auth` \
                     feature; use 'sql_server' with target.user/target.password instead"
                        .into(),
                ));
            }
        }
    }

    // Migration config validation
    let migration = &config.migration;
    if migration.tables.is_empty() {
        return Err(MigrateError::Config(
            "migration.tables must name at least one table".into(),
        ));
    }
    if let Some(blank) = migration.tables.iter().find(|t| t.trim().is_empty()) {
        return Err(MigrateError::Config(format!(
            "migration.tables contains an empty name: '{}'",
            blank
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for table in &migration.tables {
        if !seen.insert(table.to_lowercase()) {
            return Err(MigrateError::Config(format!(
                "migration.tables lists '{}' more than once",
                table
            )));
        }
    }
    required(
        &migration.staging_schema,
        "migration.staging_schema",
        "the config file",
    )?;
    required(
        &migration.batch_separator,
        "migration.batch_separator",
        "the config file",
    )?;
    if migration.batch_separator.chars().any(char::is_whitespace) {
        return Err(MigrateError::Config(
            "migration.batch_separator must not contain whitespace".into(),
        ));
    }
    if migration.rows_per_insert == 0 || migration.rows_per_insert > MAX_ROWS_PER_INSERT {
        return Err(MigrateError::Config(format!(
            "migration.rows_per_insert must be between 1 and {}",
            MAX_ROWS_PER_INSERT
        )));
    }

    Ok(())
}
