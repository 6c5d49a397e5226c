//! Award Harvester main entry point
//!
//! This is the command-line interface for the award-notice harvester.

use anyhow::Context;
use award_harvester::config::{load_config_with_hash, Config, SourceConfig};
use award_harvester::harvest::run_harvest;
use award_harvester::output::print_statistics;
use chrono::NaiveDate;
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status of a run stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Award Harvester: a resilient award-notice exporter
///
/// Walks a paginated procurement API, flattens every award into a row,
/// and streams the rows to a CSV file while retrying, throttling, and
/// caching requests.
#[derive(Parser, Debug)]
#[command(name = "award-harvester")]
#[command(version)]
#[command(about = "A resilient award-notice exporter", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long)]
    dry_run: bool,

    /// Ignore and do not populate the response cache
    #[arg(long)]
    no_cache: bool,

    /// Write the CSV here instead of the configured path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// First publication day for date-range sources (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    start_date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    apply_overrides(&mut config, &cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(ExitCode::SUCCESS);
    }

    handle_harvest(config, cli.quiet).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("award_harvester=info,warn"),
            1 => EnvFilter::new("award_harvester=debug,info"),
            2 => EnvFilter::new("award_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if cli.no_cache {
        config.cache.enabled = false;
    }

    if let Some(output) = &cli.output {
        config.output.path = output.display().to_string();
    }

    if let Some(start) = cli.start_date {
        match &mut config.source {
            SourceConfig::NoticeSearch(notices) => notices.start_date = start,
            SourceConfig::OcdsSearch(_) => {
                anyhow::bail!("--start-date only applies to notice-search sources")
            }
        }
    }

    Ok(())
}

/// Handles the --dry-run mode: shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Award Harvester Dry Run ===\n");

    println!("Source ({}):", config.source.kind());
    match &config.source {
        SourceConfig::OcdsSearch(ocds) => {
            println!("  Seed URL: {}", ocds.seed_url);
            println!("  Page count field: {}", ocds.page_count_field);
            println!("  Page parameter: {}", ocds.page_param);
        }
        SourceConfig::NoticeSearch(notices) => {
            let today = chrono::Local::now().date_naive();
            let days = (today - notices.start_date).num_days().max(0);
            println!("  Search URL: {}", notices.search_url);
            println!("  Detail URL: {}", notices.detail_url);
            println!("  Status filter: {}", notices.status);
            println!(
                "  Days: {} ({} to {}, exclusive)",
                days, notices.start_date, today
            );
        }
    }

    let fetcher = &config.fetcher;
    println!("\nFetcher:");
    println!("  Max retries: {}", fetcher.max_retries);
    println!("  Retry delay: {}ms", fetcher.retry_delay_ms);
    println!("  Attempt timeout: {}ms", fetcher.timeout_ms);
    println!(
        "  Rate limit: {} per {}ms",
        fetcher.max_requests, fetcher.per_ms
    );
    println!("  Max in flight: {}", fetcher.max_in_flight);
    println!("  Throttle statuses: {:?}", fetcher.throttle_statuses);
    println!("  On failure: {:?}", fetcher.on_failure);
    println!("  User agent: {}", fetcher.user_agent);

    println!("\nCache:");
    if config.cache.enabled {
        println!("  Directory: {}", config.cache.directory);
    } else {
        println!("  Disabled");
    }

    println!("\nOutput:");
    println!("  CSV: {}", config.output.path);

    println!("\n✓ Configuration is valid");
}

/// Cancels the run on the first interrupt
///
/// Returns `true` once a second interrupt arrives while the run drains, and
/// `false` if the signal listener fails.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !next_interrupt().await {
        return false;
    }
    tracing::warn!("Interrupt received, finishing in-flight requests (Ctrl-C again to stop now)...");
    cancel.cancel();

    if !next_interrupt().await {
        return false;
    }
    tracing::error!("Second interrupt received, exiting without draining");
    true
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, quiet: bool) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = || async { tokio::signal::ctrl_c().await.is_ok() };
        if watch_interrupts(ctrl_c, interrupt).await {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });

    let stats = run_harvest(&config, cancel)
        .await
        .context("Harvest failed")?;

    if !quiet {
        print_statistics(&stats);
    }

    if stats.interrupted {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
