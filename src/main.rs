use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warplog::config::Config;
use warplog::discovery::LinkDiscoverer;
use warplog::error::{Error, WarplogErrorTrait};
use warplog::orchestrator::{
    AbortReason, CategoryReport, CategoryStatus, Orchestrator, RunEvent, RunOutcome, RunState,
};
use warplog::storage::PersistedStore;
use warplog::utils::redact_link;

#[derive(Parser)]
#[command(
    name = "warplog",
    version,
    about = "Warp history tracker: recovers the history link, fetches every banner and keeps pity statistics",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every banner and merge new pulls into the store
    Fetch {
        /// Store file path
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Language for item names
        #[arg(short, long)]
        lang: Option<String>,

        /// Use this history link instead of searching local files
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Search local game files for the history link
    Discover,

    /// Show statistics from the store
    Stats {
        /// Store file path
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Only show this banner id
        #[arg(short, long)]
        banner: Option<String>,
    },

    /// Merge another store file into the store
    Import {
        /// Store file to import
        file: PathBuf,

        /// Store file path
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli.log_format.unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, cli.verbose, &config.logging.level)?;

    tracing::info!("warplog starting");

    match cli.command {
        Commands::Fetch { store, lang, url } => {
            if let Some(store) = store {
                config.storage.store_path = store;
            }
            if let Some(lang) = lang {
                config.api.lang = lang;
            }
            tracing::info!(
                store = %config.storage.store_path.display(),
                lang = %config.api.lang,
                preset_link = url.is_some(),
                "Starting fetch command"
            );
            fetch(config, url).await?;
        }

        Commands::Discover => {
            tracing::info!("Starting discover command");
            discover(&config).await?;
        }

        Commands::Stats { store, banner } => {
            let store = store.unwrap_or_else(|| config.storage.store_path.clone());
            tracing::info!(store = %store.display(), banner = ?banner, "Starting stats command");
            stats(&config, &store, banner.as_deref())?;
        }

        Commands::Import { file, store } => {
            let store = store.unwrap_or_else(|| config.storage.store_path.clone());
            tracing::info!(
                file = %file.display(),
                store = %store.display(),
                "Starting import command"
            );
            import(&file, &store)?;
        }
    }

    tracing::info!("warplog completed successfully");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, verbose: bool, level: &str) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("warplog=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("warplog={level},warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn fetch(config: Config, url: Option<String>) -> Result<()> {
    let store = PersistedStore::load(&config.storage.store_path)?;
    let orchestrator = Orchestrator::new(config, store)?;
    let mut events = orchestrator.subscribe();

    let Some(mut run) = orchestrator.trigger_with_link(url) else {
        anyhow::bail!("A fetch run is already in progress");
    };

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => {}
            },
            result = &mut run => {
                while let Ok(event) = events.try_recv() {
                    print_event(&event);
                }
                break result.context("Fetch run panicked")?;
            }
        }
    };

    match outcome {
        RunOutcome::Completed(report) => {
            println!();
            println!("{}", report.summary);
            println!("{} new pulls saved", report.accepted());
            if let Some(err) = report.save_error {
                anyhow::bail!("Failed to save store: {err}");
            }
            Ok(())
        }
        RunOutcome::Aborted(reason) => {
            print_abort(&reason);
            let err = Error::from(reason);
            tracing::error!(
                category = err.category().as_str(),
                recoverable = err.is_recoverable(),
                "Fetch aborted"
            );
            Err(err.into())
        }
    }
}

async fn discover(config: &Config) -> Result<()> {
    let discoverer = LinkDiscoverer::from_config(&config.discovery);
    let candidate = tokio::task::spawn_blocking(move || discoverer.discover())
        .await
        .context("Discovery task failed")?;

    match candidate {
        Some(candidate) => {
            println!("Found in {}: {}", candidate.source, redact_link(&candidate.url));
            Ok(())
        }
        None => {
            print_abort(&AbortReason::NoLinkFound);
            Err(Error::NoLinkFound.into())
        }
    }
}

fn stats(config: &Config, path: &Path, banner: Option<&str>) -> Result<()> {
    let store = PersistedStore::load(path)?;

    if let Some(id) = banner {
        let history = store
            .history(id)
            .with_context(|| format!("No records for banner {id}"))?;
        let name = config
            .banner(id)
            .map_or_else(|| history.name(), |spec| spec.name.as_str());
        println!("[{id}] {name}");
        print!("{}", history.stats());
        return Ok(());
    }

    if store.is_empty() {
        println!("No records in {}", path.display());
        return Ok(());
    }

    for spec in &config.banners {
        if let Some(history) = store.history(&spec.id) {
            println!("[{}] {}", spec.id, history.name());
            print!("{}", history.stats());
        }
    }
    println!();
    print!("{}", store.summary(&config.banners));
    Ok(())
}

fn import(file: &Path, path: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Import file not found: {}", file.display());
    }

    let foreign = PersistedStore::load(file)?;
    let mut store = PersistedStore::load(path)?;
    let accepted = store.import(foreign);
    store.save(path)?;

    println!("Imported {accepted} new pulls into {}", path.display());
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::StateChanged(state) => match state {
            RunState::Discovering => println!("Searching for history link..."),
            RunState::Validating => println!("Checking history link..."),
            RunState::FetchingCategory { banner, .. } => println!("Fetching banner {banner}..."),
            RunState::Idle | RunState::Done | RunState::Aborted(_) => {}
        },
        RunEvent::CategoryFinished(report) => print_category(report),
        RunEvent::Finished(_) => {}
    }
}

fn print_category(report: &CategoryReport) {
    match &report.status {
        CategoryStatus::Merged {
            fetched, accepted, ..
        } => println!("  {}: {fetched} fetched, {accepted} new", report.name),
        CategoryStatus::NoData => println!("  {}: no data available", report.name),
        CategoryStatus::Failed {
            error,
            page,
            fetched,
            accepted,
        } => {
            println!(
                "  {}: failed on page {page} ({error}), kept {fetched} fetched, {accepted} new",
                report.name
            );
        }
    }
}

fn print_abort(reason: &AbortReason) {
    eprintln!("Stopped: {reason}");
    eprintln!("{}", reason.remediation());
}
