//! SIDEPOTS: fantasy football side competitions
//!
//! Entry point. Loads configuration, initialises structured logging, takes
//! the run lock, then computes and posts the requested sidepot reports for
//! the selected weeks. Exits non-zero if any requested sidepot failed.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use sidepots::config::AppConfig;
use sidepots::data::espn::EspnClient;
use sidepots::engine::dispatch::Dispatcher;
use sidepots::engine::orchestrator::Orchestrator;
use sidepots::guard::{FileRunGuard, RunLease};
use sidepots::notify::discord::DiscordNotifier;
use sidepots::schedule::WeekSpec;
use sidepots::types::ModeSelection;

/// Compute weekly fantasy football sidepots and post them to webhooks.
#[derive(Debug, Parser)]
#[command(name = "sidepots", version, about)]
struct Cli {
    /// Which sidepot to run.
    #[arg(long, value_enum, default_value = "all")]
    mode: ModeSelection,

    /// Weeks to process: `auto`, `4`, `1-3` or `1,3,5`.
    #[arg(long, default_value = "auto")]
    weeks: WeekSpec,

    /// Compute and print reports without posting them.
    #[arg(long)]
    dry_run: bool,

    /// Path to the TOML config file.
    #[arg(long, default_value = "config/league.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{e:#}"), "Run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = AppConfig::load(&cli.config)?;
    cfg.log_summary();

    info!(
        mode = ?cli.mode,
        weeks = %cli.weeks,
        dry_run = cli.dry_run,
        "SIDEPOTS starting up"
    );

    // -- Run lock --------------------------------------------------------

    let guard = FileRunGuard::new(cfg.run.lock_path.as_str(), cfg.run.stale_after());
    let Some(lease) = RunLease::acquire(&guard, Utc::now())? else {
        return Ok(ExitCode::SUCCESS);
    };

    // -- Initialise components -------------------------------------------

    let source = Arc::new(EspnClient::new(&cfg.league, &cfg.http)?);
    let notifier = Arc::new(DiscordNotifier::new()?);
    let settings = cfg.run_settings()?;
    let dispatcher = Dispatcher::new(
        notifier,
        cfg.webhooks.clone(),
        cli.dry_run,
        settings.retry.clone(),
    );
    let orchestrator = Orchestrator::new(source, dispatcher, settings);

    // -- Run -------------------------------------------------------------

    let summary = orchestrator.run(cli.mode, &cli.weeks, Utc::now()).await;
    lease.release().context("Failed to release run lock")?;

    for result in &summary.results {
        info!(mode = %result.mode, status = ?result.status, "Sidepot result");
    }

    Ok(ExitCode::from(summary.exit_code()))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sidepots=info"));

    let json_logging = std::env::var("SIDEPOTS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
