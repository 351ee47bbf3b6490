//! Merchsync CLI - command-line interface for the migration engine.

mod config;
mod progress;
mod shutdown;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use merchsync::migration::{Migrator, MigratorTrait};
use merchsync::{
    rate_limits, AdaptiveRateLimiter, BatchFilter, BreakerRegistry, CheckpointManager,
    CheckpointRecord, EngineConfig, MigrationEngine, RemoteSyncService, ReqwestTransport,
    RetryConfig, SourceStore, SyncStrategy,
};

use crate::config::Config;
use crate::progress::LoggingReporter;

#[derive(Parser)]
#[command(name = "merchsync")]
#[command(version)]
#[command(about = "Migrate product records into a commerce platform")]
#[command(
    long_about = "Merchsync migrates product records from a local store into a remote \
commerce/payment platform, creating product and price entities idempotently, \
writing remote identifiers back, and checkpointing progress so interrupted \
runs can resume."
)]
#[command(after_long_help = r#"EXAMPLES
    Rehearse a migration without touching the remote platform:
        $ merchsync run --dry-run

    Migrate in batches of 100, resuming from the last checkpoint:
        $ merchsync run --resume --batch-size 100

    Migrate only specific records:
        $ merchsync run --strategy selective --id 0190c7a4-... --id 0190c7a5-...

    Inspect the current checkpoint:
        $ merchsync status

CONFIGURATION
    Merchsync reads configuration from:
      1. ~/.config/merchsync/config.toml (or $XDG_CONFIG_HOME/merchsync/config.toml)
      2. ./merchsync.toml
      3. Environment variables (MERCHSYNC_* prefix)
      4. .env file in the current directory

ENVIRONMENT VARIABLES
    MERCHSYNC_DATABASE_URL        Source database URL (default: ~/.local/state/merchsync/products.db)
    MERCHSYNC_REMOTE_BASE_URL     Remote platform API base URL
    MERCHSYNC_REMOTE_API_KEY      Remote platform API key
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a migration
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Show the current checkpoint, if any
    Status,
    /// Delete the checkpoint and its backup
    ClearCheckpoint,
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Every record
    Full,
    /// Records updated within --since / --before
    Incremental,
    /// Only the records named with --id
    Selective,
}

impl From<StrategyArg> for SyncStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Full => SyncStrategy::Full,
            StrategyArg::Incremental => SyncStrategy::Incremental,
            StrategyArg::Selective => SyncStrategy::Selective,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
struct RunArgs {
    /// Dry run - rehearse the migration without any remote or local writes
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Resume from the last checkpoint if one validates
    #[arg(long)]
    resume: bool,

    /// Disable checkpointing entirely (no reads, no writes)
    #[arg(long, conflicts_with = "resume")]
    no_checkpoint: bool,

    /// Records per batch (default from config or 50)
    #[arg(short = 'b', long)]
    batch_size: Option<u64>,

    /// Relax validation: title and description problems become warnings
    #[arg(long)]
    skip_validation: bool,

    /// Which records the run covers
    #[arg(long, value_enum, default_value_t = StrategyArg::Full)]
    strategy: StrategyArg,

    /// Lower bound on updated_at for --strategy incremental (RFC 3339)
    #[arg(long, value_parser = parse_rfc3339)]
    since: Option<DateTime<Utc>>,

    /// Upper bound on updated_at for --strategy incremental (RFC 3339)
    #[arg(long, value_parser = parse_rfc3339)]
    before: Option<DateTime<Utc>>,

    /// Record id for --strategy selective (repeatable)
    #[arg(long = "id")]
    ids: Vec<Uuid>,

    /// Also process records already marked synced
    #[arg(long)]
    include_synced: bool,

    /// Skip the post-run verification sampling
    #[arg(long)]
    no_verify: bool,

    /// Checkpoint file path (default: state directory)
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Report artifact path (default: state directory)
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("not an RFC 3339 timestamp: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("merchsync=info,merchsync_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config = Config::load();
    let cli = Cli::parse();

    match run_command(cli.command, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::from(1)
        }
    }
}

async fn run_command(command: Commands, config: &Config) -> Result<bool, Box<dyn Error>> {
    let database_url = config
        .database_url()
        .ok_or("failed to determine database URL")?;
    ensure_sqlite_dir(&database_url)?;

    match command {
        Commands::Run { args } => handle_run(args, config, &database_url).await,
        Commands::Status => handle_status(config),
        Commands::ClearCheckpoint => {
            let manager = CheckpointManager::new(config.checkpoint_path(), String::new(), 0);
            manager.clear()?;
            println!("Checkpoint cleared.");
            Ok(true)
        }
        Commands::Migrate { action } => {
            let db = merchsync::connect(&database_url).await?;
            match action {
                MigrateAction::Up => Migrator::up(&db, None).await?,
                MigrateAction::Status => Migrator::status(&db).await?,
                MigrateAction::Fresh => Migrator::fresh(&db).await?,
            }
            Ok(true)
        }
    }
}

/// Ensure the parent directory exists for SQLite database files.
fn ensure_sqlite_dir(database_url: &str) -> Result<(), Box<dyn Error>> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

async fn handle_run(
    args: RunArgs,
    config: &Config,
    database_url: &str,
) -> Result<bool, Box<dyn Error>> {
    let db = merchsync::connect_and_migrate(database_url).await?;

    let api_key = config.remote.api_key.clone().ok_or(
        "remote API key not configured (set MERCHSYNC_REMOTE_API_KEY or remote.api_key)",
    )?;
    let transport = ReqwestTransport::new(
        &config.remote.base_url,
        api_key,
        Duration::from_secs(config.remote.timeout_secs),
    )?;

    let limiter = AdaptiveRateLimiter::new(
        config.migration.requests_per_window,
        Duration::from_millis(rate_limits::WINDOW_MS),
    );
    let retry = RetryConfig {
        max_retries: config.migration.max_retries,
        ..RetryConfig::default()
    };
    let remote = RemoteSyncService::new(
        Arc::new(transport),
        limiter,
        Arc::new(BreakerRegistry::default()),
        retry,
    )
    .with_name_fallback(config.remote.allow_name_fallback)
    .with_dry_run(args.dry_run);

    let filter = BatchFilter {
        strategy: args.strategy.into(),
        updated_since: args.since,
        updated_before: args.before,
        ids: args.ids.clone(),
        skip_synced: !args.include_synced,
    };
    let engine_config = EngineConfig {
        batch_size: args.batch_size.unwrap_or(config.migration.batch_size),
        concurrency: config.migration.concurrency,
        checkpoint_interval: config.migration.checkpoint_interval,
        inter_batch_delay: Duration::from_millis(config.migration.inter_batch_delay_ms),
        verify_sample_every: if args.no_verify {
            0
        } else {
            config.migration.verify_sample_every
        },
        dry_run: args.dry_run,
        resume: args.resume,
        use_checkpoint: !args.no_checkpoint,
        skip_validation: args.skip_validation,
        filter,
        checkpoint_path: args.checkpoint.unwrap_or_else(|| config.checkpoint_path()),
        report_path: Some(args.report.unwrap_or_else(|| config.report_path())),
    };

    let engine = MigrationEngine::new(SourceStore::new(db), Arc::new(remote), engine_config);
    shutdown::setup_shutdown_handler(engine.pause_handle());

    let callback = LoggingReporter::new().into_callback();
    let report = engine.run(Some(&callback)).await?;

    println!();
    println!(
        "{}  processed {}  succeeded {}  failed {}  skipped {}",
        if report.is_clean() {
            style("OK").green().bold()
        } else {
            style("INCOMPLETE").yellow().bold()
        },
        report.processed,
        style(report.succeeded).green(),
        style(report.failed).red(),
        report.skipped,
    );
    for entry in report.errors.iter().take(10) {
        println!("  {} {}: {}", style("failed").red(), entry.source_id, entry.message);
    }
    if report.errors.len() > 10 {
        println!("  ... and {} more (see report artifact)", report.errors.len() - 10);
    }

    Ok(report.is_clean())
}

fn handle_status(config: &Config) -> Result<bool, Box<dyn Error>> {
    let path = config.checkpoint_path();
    let json = match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No checkpoint at {}", path.display());
            return Ok(true);
        }
        Err(e) => return Err(e.into()),
    };
    let record: CheckpointRecord = serde_json::from_str(&json)?;

    println!("Checkpoint: {}", path.display());
    println!("  saved at:   {}", record.timestamp);
    println!("  processed:  {}", record.state.processed);
    println!("  succeeded:  {}", record.state.succeeded);
    println!("  failed:     {}", record.state.failed);
    println!("  skipped:    {}", record.state.skipped);
    if let Some(id) = record.state.last_processed_id {
        println!("  last id:    {id}");
    }
    println!("  paused:     {}", record.state.is_paused);
    Ok(true)
}
