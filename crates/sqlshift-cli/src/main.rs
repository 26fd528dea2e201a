//! sqlshift CLI - heterogeneous-source migration to SQL Server / Azure SQL.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sqlshift::{config, validate, LogLevel, MigrateError, Orchestrator, RunOptions, SystemPorts};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "sqlshift")]
#[command(about = "Migrate relational data from SQL Server, Azure SQL, Oracle, MySQL, or PostgreSQL into SQL Server / Azure SQL")]
#[command(version)]
struct Cli {
    /// Path to the master migration XML
    #[arg(short, long, default_value = "master.xml")]
    config: PathBuf,

    /// Path to the global configuration XML
    #[arg(long)]
    global_config: Option<PathBuf>,

    /// Validate configuration, connectivity, and mappings without writing any data
    #[arg(long)]
    validate_only: bool,

    /// Continue the most recent run for this migration name
    #[arg(long)]
    resume: bool,

    /// Restrict the run to tables whose inclusion flag is set
    #[arg(long)]
    table_filter: bool,

    /// Log verbosity: Error, Warning, Info, Verbose, Debug
    #[arg(long)]
    log_level: Option<String>,

    /// Directory for progress, row-error, and error-log artefacts
    #[arg(long, default_value = "status")]
    status_dir: PathBuf,

    /// Directory for validation artefacts
    #[arg(long, default_value = "validation")]
    validation_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    let cli_level = match cli.log_level.as_deref() {
        None => None,
        Some(s) => Some(LogLevel::parse(s).ok_or_else(|| {
            MigrateError::Config(format!(
                "unknown log level '{}' (expected Error, Warning, Info, Verbose, or Debug)",
                s
            ))
        })?),
    };

    if cli.validate_only {
        let (plan, report) = config::load_lenient(&cli.config, cli.global_config.as_deref())?;
        setup_logging(cli_level.or(plan.default_log_level));

        let result = validate::run(&plan, &report, &SystemPorts).await;
        let path = validate::write(&result, &cli.validation_dir)?;
        info!("validation artefact written to {}", path.display());

        println!(
            "validation {}: {} table(s), {} error(s), {} warning(s)",
            if result.is_valid { "passed" } else { "FAILED" },
            result.summary.tables_validated,
            result.summary.errors_found,
            result.summary.warnings_found,
        );
        return Ok(if result.is_valid {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let plan = config::load(&cli.config, cli.global_config.as_deref())?;
    setup_logging(cli_level.or(plan.default_log_level));

    let cancel = setup_signal_handler();

    let orchestrator = Orchestrator::new(
        plan,
        RunOptions {
            resume: cli.resume,
            table_filter: cli.table_filter,
            status_dir: cli.status_dir,
        },
    );

    let summary = orchestrator.run(cancel).await?;
    println!(
        "run {} {:?}: {}/{} table(s) migrated ({} skipped), {} row(s), {} row error(s)",
        summary.run_id,
        summary.status,
        summary.tables_completed,
        summary.tables_total,
        summary.tables_skipped,
        summary.rows_processed,
        summary.row_errors,
    );
    Ok(ExitCode::SUCCESS)
}

/// Build the subscriber once from configuration and flags; the library
/// never touches global log state.
fn setup_logging(level: Option<LogLevel>) {
    let filter = level.unwrap_or(LogLevel::Info).as_filter();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .try_init();
}

/// SIGINT requests a cooperative stop: the in-flight batch finishes, then
/// the run tears down cleanly.
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received; finishing current batch before shutting down");
            token.cancel();
        }
    });
    cancel
}
