//! SQL script execution against the target.
//!
//! Scripts are split on a batch separator (`GO` by default) and the batches
//! run one by one on the target connection, inside the open transaction.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::TargetConnection;
use crate::error::{MigrateError, Result};

/// Where a script's text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// A file read in full when the script runs.
    File(PathBuf),
    /// Literal SQL with a label used in logs and errors.
    Text { label: String, sql: String },
}

impl ScriptSource {
    pub fn text(label: impl Into<String>, sql: impl Into<String>) -> Self {
        ScriptSource::Text {
            label: label.into(),
            sql: sql.into(),
        }
    }

    /// Name used in logs and errors.
    pub fn label(&self) -> String {
        match self {
            ScriptSource::File(path) => path.display().to_string(),
            ScriptSource::Text { label, .. } => label.clone(),
        }
    }

    fn read(&self) -> std::io::Result<Cow<'_, str>> {
        match self {
            ScriptSource::File(path) => std::fs::read_to_string(path).map(Cow::Owned),
            ScriptSource::Text { sql, .. } => Ok(Cow::Borrowed(sql)),
        }
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Outcome of one executed script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptResult {
    pub script: String,
    pub batches: usize,
}

/// Split script text into trimmed, non-empty batches.
///
/// A separator line is one whose only content, ignoring surrounding
/// whitespace, is the separator. Matching is case-sensitive, and a separator
/// that shares a line with SQL (inside a string, a comment or a statement)
/// never splits a batch.
pub fn split_batches<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let separator = separator.trim();
    let mut batches = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if !separator.is_empty() && line.trim() == separator {
            push_batch(&mut batches, &text[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    push_batch(&mut batches, &text[start..]);

    batches
}

fn push_batch<'a>(batches: &mut Vec<&'a str>, fragment: &'a str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        batches.push(trimmed);
    }
}

/// Run every batch of a script on the target, in order.
///
/// Stops at the first failing batch, rolls back the target and reports the
/// 1-based batch number. A script that cannot be read fails with batch 0.
pub async fn run_script<T: TargetConnection>(
    target: &mut T,
    script: &ScriptSource,
    separator: &str,
) -> Result<ScriptResult> {
    let label = script.label();

    let text = match script.read() {
        Ok(text) => text,
        Err(e) => {
            rollback_after_failure(target, &label).await;
            return Err(MigrateError::script(&label, 0, format!("reading script: {}", e)));
        }
    };

    let batches = split_batches(&text, separator);
    info!("Executing script {} ({} batches)", label, batches.len());

    for (i, batch) in batches.iter().enumerate() {
        let number = i + 1;
        debug!("Script {} batch {}/{}", label, number, batches.len());
        if let Err(e) = target.execute_batch(batch).await {
            rollback_after_failure(target, &label).await;
            return Err(MigrateError::script(&label, number, e));
        }
    }

    Ok(ScriptResult {
        script: label,
        batches: batches.len(),
    })
}

async fn rollback_after_failure<T: TargetConnection>(target: &mut T, label: &str) {
    if let Err(e) = target.rollback().await {
        warn!("Rollback after failed script {} also failed: {}", label, e);
    }
}
