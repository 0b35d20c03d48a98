//! staging-migrate CLI - stage MySQL operational tables into SQL Server.

use clap::{Parser, Subcommand};
use staging_migrate::{Config, MigrateError, Orchestrator};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Parser)]
#[command(name = "staging-migrate")]
#[command(about = "Stage MySQL operational tables into SQL Server and run the migration scripts")]
#[command(after_help = "Target authentication defaults to integrated (trusted) identity, which \
needs a build with `--features integrated-auth`. Other builds must set \
MIGRATE_TARGET_AUTH=sql_server with MIGRATE_TARGET_USER and MIGRATE_TARGET_PASSWORD.")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration (default)
    Run,

    /// Test database connections
    HealthCheck,

    /// Print the resolved configuration with passwords redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    load_env_file(cli.env_file.as_deref())?;

    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_deref())?;

    let config = Config::resolve(cli.config.as_deref())?;
    match &cli.config {
        Some(path) => info!("Loaded configuration from {:?} and environment", path),
        None => info!("Loaded configuration from environment"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let orchestrator = Orchestrator::new(config);
            let result = match orchestrator.run().await {
                Ok(result) => result,
                Err(e) => {
                    error!("Migration failed: {}", e);
                    return Err(e);
                }
            };
            info!("Migration completed successfully");

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                for table in &result.tables {
                    println!(
                        "  {}: {} extracted, {} staged",
                        table.table, table.rows_extracted, table.rows_inserted
                    );
                }
                println!("  Rows staged: {}", result.rows_staged);
                for script in &result.scripts {
                    println!("  Script {}: {} batches", script.script, script.batches);
                }
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::new(config).health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (SQL Server): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let side = if result.source_connected { "target" } else { "source" };
                return Err(MigrateError::connection(side, "health check failed"));
            }
        }

        Commands::CheckConfig => {
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            } else {
                print!("{}", config.to_redacted_yaml()?);
                println!("# config hash: {}", config.hash());
            }
        }
    }

    Ok(())
}

/// Load `.env` style variables. An explicit file must exist; the default
/// `./.env` is optional. Variables already set in the environment win.
fn load_env_file(path: Option<&Path>) -> Result<(), MigrateError> {
    match path {
        Some(path) => {
            if !path.is_file() {
                return Err(MigrateError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("env file not found: {}", path.display()),
                )));
            }
            dotenvy::from_path(path).map_err(|e| {
                MigrateError::Config(format!("invalid env file {}: {}", path.display(), e))
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn setup_logging(
    verbosity: &str,
    format: &str,
    log_file: Option<&Path>,
) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let writer = match log_file {
        Some(path) => BoxMakeWriter::new(Mutex::new(File::create(path)?)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(log_file.is_none())
        .with_writer(writer);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
