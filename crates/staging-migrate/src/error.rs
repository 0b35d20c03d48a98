//! Error types for the migration library.

use thiserror::Error;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when either database cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code for source read failures.
pub const EXIT_EXTRACTION_ERROR: u8 = 3;
/// Process exit code for staging write failures.
pub const EXIT_INSERTION_ERROR: u8 = 4;
/// Process exit code for DDL/validation/transformation script failures.
pub const EXIT_SCRIPT_ERROR: u8 = 5;
/// Process exit code for commit failures.
pub const EXIT_COMMIT_ERROR: u8 = 6;
/// Process exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Process exit code for YAML/JSON errors outside configuration loading.
pub const EXIT_SERIALIZATION_ERROR: u8 = 8;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Missing or invalid settings, including a malformed config file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Either database could not be reached.
    #[error("Connection to {database} database failed: {message}")]
    Connection { database: String, message: String },

    /// Reading a table from the source failed.
    #[error("Extraction failed for table {table}: {message}")]
    Extraction { table: String, message: String },

    /// Writing into a staging table failed (includes constraint violations).
    #[error("Insertion failed for table {table}: {message}")]
    Insertion { table: String, message: String },

    /// A batch of a DDL, validation or transformation script failed.
    #[error("Script {script} failed at batch {batch}: {message}")]
    ScriptExecution {
        script: String,
        batch: usize,
        message: String,
    },

    /// Commit failed. `partial` is set when the other side was already committed.
    #[error("Commit of {database} database failed{}: {message}", partial_suffix(.partial))]
    Commit {
        database: String,
        partial: bool,
        message: String,
    },

    /// Source database driver error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database driver error
    #[error("Target database error: {0}")]
    Target(#[from] tiberius::error::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error for the named side (`source` or `target`).
    pub fn connection(database: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            database: database.into(),
            message: message.to_string(),
        }
    }

    /// Create an Extraction error
    pub fn extraction(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Extraction {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an Insertion error
    pub fn insertion(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Insertion {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a ScriptExecution error. `batch` is 1-based; 0 means the script
    /// could not be read at all.
    pub fn script(script: impl Into<String>, batch: usize, message: impl ToString) -> Self {
        MigrateError::ScriptExecution {
            script: script.into(),
            batch,
            message: message.to_string(),
        }
    }

    /// Create a Commit error
    pub fn commit(database: impl Into<String>, partial: bool, message: impl ToString) -> Self {
        MigrateError::Commit {
            database: database.into(),
            partial,
            message: message.to_string(),
        }
    }

    /// Exit code reported at the process boundary.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Extraction { .. } | MigrateError::Source(_) => EXIT_EXTRACTION_ERROR,
            MigrateError::Insertion { .. } | MigrateError::Target(_) => EXIT_INSERTION_ERROR,
            MigrateError::ScriptExecution { .. } => EXIT_SCRIPT_ERROR,
            MigrateError::Commit { .. } => EXIT_COMMIT_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Yaml(_) | MigrateError::Json(_) => EXIT_SERIALIZATION_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn partial_suffix(partial: &bool) -> &'static str {
    if *partial {
        " after the source was committed (partial commit)"
    } else {
        ""
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
