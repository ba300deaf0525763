//! Courier CLI
//!
//! Local execution entry point for the feed ingestion service.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use courier::{
    error::Result,
    models::Config,
    pipeline::{self, BackoffTracker, IngestSettings, Ingestor},
    services::{HttpFeedFetcher, MeiliIndexer},
    storage::LocalRepository,
};

/// Courier - feed ingestion into a search index
#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    about = "Crawls syndication feeds and indexes changed entries"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "storage/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl on a fixed interval until interrupted
    Run,

    /// Run a single crawl tick and print a summary
    Tick,

    /// Register a feed URL
    AddSource {
        /// Feed URL
        url: String,
    },

    /// List registered sources
    Sources,

    /// Validate configuration
    Validate,
}

/// Initialize logging from the verbosity flag, `RUST_LOG`, or the configured level.
fn init_logging(verbose: bool, configured: Option<&str>) {
    let level = if verbose {
        "debug"
    } else {
        configured.unwrap_or("info")
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path);
    config.apply_env()?;
    Ok(config)
}

async fn build_ingestor(config: &Config, repository: Arc<LocalRepository>) -> Result<Ingestor> {
    let fetcher = HttpFeedFetcher::new(&config.fetcher)?;
    let indexer = MeiliIndexer::new(&config.index)?;
    indexer.ensure_index().await?;
    log::info!(
        "Search index {} ready at {}",
        indexer.index_name(),
        config.index.url
    );

    Ok(Ingestor::new(
        repository,
        Arc::new(fetcher),
        Arc::new(indexer),
        BackoffTracker::from_config(&config.backoff),
        IngestSettings::from(&config.ingest),
    ))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let configured_level = Config::load(&cli.config).ok().map(|c| c.logging.level);
    init_logging(cli.verbose, configured_level.as_deref());

    log::info!("Courier starting...");
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");
            return Ok(());
        }
        Command::AddSource { url } => {
            let repository = LocalRepository::open(&config.storage.path).await?;
            let source = repository.add_source(&url).await?;
            println!("{}\t{}", source.id, source.url);
        }
        Command::Sources => {
            let repository = LocalRepository::open(&config.storage.path).await?;
            for source in repository.list_sources().await {
                let crawled = source
                    .last_crawled_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    source.id,
                    if source.active { "active" } else { "inactive" },
                    crawled,
                    source.url,
                    source.display_title()
                );
            }
        }
        Command::Tick => {
            config.validate()?;
            let repository = Arc::new(LocalRepository::open(&config.storage.path).await?);
            let mut ingestor = build_ingestor(&config, repository).await?;

            let deadline = tokio::time::Instant::now() + config.ingest.interval();
            let summary = ingestor.run_tick(deadline).await?;
            for report in &summary.reports {
                let status = report
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into());
                println!("{}\t{}\t{}\t{}", report.source_id, status, report.state, report.url);
                for error in &report.errors {
                    println!("\t{}: {}", error.reason(), error);
                }
            }
            for error in &summary.index_errors {
                println!("index\t{}: {}", error.reason(), error);
            }
        }
        Command::Run => {
            config.validate()?;
            let repository = Arc::new(LocalRepository::open(&config.storage.path).await?);
            log::info!("Repository: {}", repository.path().display());
            let mut ingestor = build_ingestor(&config, repository).await?;

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Failed to listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
            };
            pipeline::run_scheduler(&mut ingestor, config.ingest.interval(), shutdown).await;
        }
    }

    log::info!("Done!");
    Ok(())
}
