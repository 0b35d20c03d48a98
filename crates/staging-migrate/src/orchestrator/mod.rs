//! Migration orchestrator - main workflow coordinator.
//!
//! One run connects to both databases and executes, in order: the DDL script,
//! extract + load for every configured table, the validation script and the
//! transformation script. Success commits the source, then the target. Any
//! failure rolls both back. Both connections are closed on every path.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::{SourceConnection, TargetConnection};
use crate::drivers::{MssqlTarget, MysqlSource};
use crate::error::{MigrateError, Result};
use crate::script::{run_script, ScriptResult, ScriptSource};
use crate::transfer::{stage_table, LoadOptions, TableResult};

/// Phases of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Connecting,
    Migrating,
    Committing,
    RollingBack,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Connecting => "connecting",
            RunPhase::Migrating => "migrating",
            RunPhase::Committing => "committing",
            RunPhase::RollingBack => "rolling back",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a successful migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table row counts, in load order.
    pub tables: Vec<TableResult>,

    /// Rows written to staging across all tables.
    pub rows_staged: u64,

    /// Scripts executed, in order.
    pub scripts: Vec<ScriptResult>,

    /// Fingerprint of the configuration used.
    pub config_hash: String,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity report for both databases.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Work completed by the migrate step.
#[derive(Default)]
struct Progress {
    tables: Vec<TableResult>,
    scripts: Vec<ScriptResult>,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
}

impl Orchestrator {
    /// Create a new orchestrator. The configuration is expected to be validated.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connect to MySQL and SQL Server and run the migration.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);
        info!("Run phase: {}", RunPhase::Connecting);

        let source = match MysqlSource::connect(&self.config.source).await {
            Ok(source) => source,
            Err(e) => {
                transition(RunPhase::Connecting, RunPhase::Failed);
                return Err(e);
            }
        };
        let target = match MssqlTarget::connect(&self.config.target).await {
            Ok(target) => target,
            Err(e) => {
                close_source(source).await;
                transition(RunPhase::Connecting, RunPhase::Failed);
                return Err(e);
            }
        };

        self.execute(source, target, run_id, started_at).await
    }

    /// Run the migration over already-open connections. Both are closed
    /// before this returns.
    pub async fn run_with<S, T>(&self, source: S, target: T) -> Result<MigrationResult>
    where
        S: SourceConnection,
        T: TargetConnection,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);
        self.execute(source, target, run_id, Utc::now()).await
    }

    async fn execute<S, T>(
        &self,
        mut source: S,
        mut target: T,
        run_id: String,
        started_at: DateTime<Utc>,
    ) -> Result<MigrationResult>
    where
        S: SourceConnection,
        T: TargetConnection,
    {
        let clock = Instant::now();
        transition(RunPhase::Connecting, RunPhase::Migrating);

        let mut phase = RunPhase::Migrating;
        let mut progress = Progress::default();
        let mut outcome = self.migrate(&mut source, &mut target, &mut progress).await;

        if outcome.is_ok() {
            transition(phase, RunPhase::Committing);
            phase = RunPhase::Committing;
            outcome = commit(&mut source, &mut target).await;
        }

        match &outcome {
            Ok(()) => {
                transition(phase, RunPhase::Done);
                phase = RunPhase::Done;
            }
            Err(e) => {
                error!("Migration failed during {}: {}", phase, e);
                transition(phase, RunPhase::RollingBack);
                rollback(&mut source, &mut target).await;
                transition(RunPhase::RollingBack, RunPhase::Failed);
            }
        }

        close_source(source).await;
        close_target(target).await;

        let duration_seconds = clock.elapsed().as_secs_f64();
        if let Err(e) = outcome {
            error!(
                "Migration run {} failed after {:.1}s: {}",
                run_id, duration_seconds, e
            );
            return Err(e);
        }

        let rows_staged = progress.tables.iter().map(|t| t.rows_inserted).sum();
        let result = MigrationResult {
            run_id,
            status: phase.to_string(),
            started_at,
            completed_at: Utc::now(),
            duration_seconds,
            tables: progress.tables,
            rows_staged,
            scripts: progress.scripts,
            config_hash: self.config.hash(),
        };

        info!(
            "Migration {}: {} tables, {} rows staged, {} scripts in {:.1}s",
            result.status,
            result.tables.len(),
            result.rows_staged,
            result.scripts.len(),
            result.duration_seconds
        );

        Ok(result)
    }

    /// DDL script, every table in order, validation, transformation.
    async fn migrate<S, T>(&self, source: &mut S, target: &mut T, progress: &mut Progress) -> Result<()>
    where
        S: SourceConnection,
        T: TargetConnection,
    {
        let migration = &self.config.migration;
        let separator = migration.batch_separator.as_str();
        let options = LoadOptions::from(migration);

        info!("Step 1: Staging DDL");
        let ddl = self.script(&migration.ddl_script);
        progress.scripts.push(run_script(target, &ddl, separator).await?);

        info!("Step 2: Staging {} tables", migration.tables.len());
        for table in &migration.tables {
            progress
                .tables
                .push(stage_table(source, target, table, &options).await?);
        }

        info!("Step 3: Validation");
        let validation = self.script(&migration.validation_script);
        progress.scripts.push(run_script(target, &validation, separator).await?);

        info!("Step 4: Transformation");
        let transformation = self.script(&migration.transformation_script);
        progress
            .scripts
            .push(run_script(target, &transformation, separator).await?);

        Ok(())
    }

    fn script(&self, path: &std::path::Path) -> ScriptSource {
        ScriptSource::File(self.config.migration.resolve_script(path))
    }

    /// Connect to both databases, report latency and close again.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let source_error = match MysqlSource::connect(&self.config.source).await {
            Ok(source) => {
                close_source(source).await;
                None
            }
            Err(e) => Some(e.to_string()),
        };
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target_error = match MssqlTarget::connect(&self.config.target).await {
            Ok(target) => {
                close_target(target).await;
                None
            }
            Err(e) => Some(e.to_string()),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let source_connected = source_error.is_none();
        let target_connected = target_error.is_none();
        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        }
    }
}

fn transition(from: RunPhase, to: RunPhase) {
    info!("Run phase: {} -> {}", from, to);
}

/// Commit the source, then the target.
///
/// There is no two-phase commit: if the target commit fails after the source
/// committed, the error is reported as partial.
async fn commit<S, T>(source: &mut S, target: &mut T) -> Result<()>
where
    S: SourceConnection,
    T: TargetConnection,
{
    source
        .commit()
        .await
        .map_err(|e| MigrateError::commit("source", false, e))?;
    info!("Source transaction committed");

    if let Err(e) = target.commit().await {
        error!(
            "Source committed but target commit failed, staging changes will be rolled back: {}",
            e
        );
        return Err(MigrateError::commit("target", true, e));
    }
    info!("Target transaction committed");
    Ok(())
}

async fn rollback<S, T>(source: &mut S, target: &mut T)
where
    S: SourceConnection,
    T: TargetConnection,
{
    if let Err(e) = source.rollback().await {
        warn!("Failed to roll back {} source: {}", source.name(), e);
    }
    if let Err(e) = target.rollback().await {
        warn!("Failed to roll back {} target: {}", target.name(), e);
    }
}

async fn close_source<S: SourceConnection>(source: S) {
    let name = source.name().to_string();
    match source.close().await {
        Ok(()) => info!("Closed {} source connection", name),
        Err(e) => warn!("Failed to close {} source connection: {}", name, e),
    }
}

async fn close_target<T: TargetConnection>(target: T) {
    let name = target.name().to_string();
    match target.close().await {
        Ok(()) => info!("Closed {} target connection", name),
        Err(e) => warn!("Failed to close {} target connection: {}", name, e),
    }
}
