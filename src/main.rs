use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vehicle_ledger::{
    cache::{FsBlobStore, RawContentCache},
    config::Config,
    fetch::{build_fetcher, CachedPages},
    logging,
    models::{Model, QueueStatus, SourceId},
    normalize::{taxonomy, Normalizer},
    pipeline::{maintenance, Orchestrator, RunParams},
    store::{ListingStore, SledStore, Store},
    vin,
};

#[derive(Parser)]
#[command(name = "vehicle-ledger")]
#[command(about = "Collector-car listing ingestion and normalization")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "vehicle-ledger.toml")]
    config: PathBuf,

    /// Data directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more sources (all when none given)
    Run {
        sources: Vec<SourceId>,

        /// Maximum index pages per source
        #[arg(short, long)]
        max_pages: Option<u32>,

        /// Include live listings, not only sold ones
        #[arg(long)]
        include_unsold: bool,

        /// Restrict to one model line (e.g. 911, Cayman)
        #[arg(long, value_parser = parse_model)]
        model: Option<Model>,

        /// Restrict to one trim (e.g. "GT3 RS")
        #[arg(long)]
        trim: Option<String>,

        /// Only seed the queue, skip detail pages
        #[arg(long)]
        index_only: bool,

        /// Write the run reports as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Decode a VIN and print the result as JSON
    DecodeVin {
        vin: String,
    },

    /// Re-normalize every stored listing
    Normalize,

    /// Parse cached pages again without network access
    Reparse {
        sources: Vec<SourceId>,
    },

    /// Move failed or rescrape-flagged queue items back to pending
    Requeue {
        source: SourceId,

        /// Statuses to reset
        #[arg(long, value_delimiter = ',', default_values = ["failed", "needs_rescrape"], value_parser = parse_status)]
        status: Vec<QueueStatus>,
    },

    /// Show per-source counts
    Stats,
}

fn parse_model(s: &str) -> Result<Model, String> {
    taxonomy::canonical_model(s).ok_or_else(|| format!("unknown model '{}'", s))
}

fn parse_status(s: &str) -> Result<QueueStatus, String> {
    match s.trim().to_lowercase().replace('-', "_").as_str() {
        "pending" => Ok(QueueStatus::Pending),
        "done" => Ok(QueueStatus::Done),
        "failed" => Ok(QueueStatus::Failed),
        "needs_rescrape" | "rescrape" => Ok(QueueStatus::NeedsRescrape),
        _ => Err(format!("unknown queue status '{}'", s)),
    }
}

fn sources_or_all(sources: Vec<SourceId>) -> Vec<SourceId> {
    if sources.is_empty() {
        SourceId::ALL.to_vec()
    } else {
        sources
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let path = config.storage.db_path();
    let store = SledStore::open(&path)?;
    Ok(Arc::new(store))
}

fn open_cache(config: &Config, store: Arc<dyn Store>) -> RawContentCache {
    let blobs = Arc::new(FsBlobStore::new(config.storage.cache_dir()));
    RawContentCache::new(blobs, store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Run {
            sources,
            max_pages,
            include_unsold,
            model,
            trim,
            index_only,
            report,
        } => {
            // Credentials are checked before anything touches the network
            let fetcher = build_fetcher(&config.fetch)?;
            let store = open_store(&config)?;
            let cache = open_cache(&config, store.clone());
            let orchestrator = Orchestrator::new(store, CachedPages::new(fetcher, cache), &config);

            info!("🚗 Vehicle Ledger");
            let runs: Vec<RunParams> = sources_or_all(sources)
                .into_iter()
                .map(|source| RunParams {
                    max_index_pages: max_pages,
                    only_sold: !include_unsold,
                    model,
                    trim: trim.clone(),
                    index_only,
                    ..RunParams::new(source)
                })
                .collect();
            let outcome = orchestrator.run_all(&runs).await;
            for result in &outcome.reports {
                println!("{}", result);
            }

            if let Some(path) = report {
                let failures: Vec<_> = outcome
                    .failures
                    .iter()
                    .map(|(source, e)| serde_json::json!({ "source": source, "error": e.to_string() }))
                    .collect();
                let json = serde_json::to_string_pretty(&serde_json::json!({
                    "reports": outcome.reports,
                    "failures": failures,
                }))?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                info!("💾 Saved run report to {}", path.display());
            }

            if !outcome.is_success() {
                let failed: Vec<String> = outcome.failures.iter().map(|(source, _)| source.to_string()).collect();
                anyhow::bail!("{} source(s) failed: {}", failed.len(), failed.join(", "));
            }
        }

        Commands::DecodeVin { vin } => {
            let normalizer = Normalizer::new(config.validation.clone());
            let decoded = vin::decode(&vin, normalizer.reference_year());
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }

        Commands::Normalize => {
            let store = open_store(&config)?;
            let normalizer = Normalizer::new(config.validation.clone());
            let report = maintenance::normalize_all(store.as_ref(), &normalizer)?;
            info!(
                "✅ Examined {} listings, {} changed, {} fields rejected",
                report.examined, report.changed, report.rejections
            );
        }

        Commands::Reparse { sources } => {
            let store = open_store(&config)?;
            let cache = open_cache(&config, store.clone());
            let normalizer = Normalizer::new(config.validation.clone());
            for source in sources_or_all(sources) {
                let report = maintenance::reparse_from_cache(store.as_ref(), &cache, &normalizer, source).await?;
                println!("{}", report);
            }
        }

        Commands::Requeue { source, status } => {
            let store = open_store(&config)?;
            let reset = maintenance::requeue(store.as_ref(), source, &status)?;
            info!("🔁 Requeued {} items for {}", reset, source);
        }

        Commands::Stats => {
            let store = open_store(&config)?;
            for source in SourceId::ALL {
                println!("{}", maintenance::source_stats(store.as_ref(), source)?);
            }
            println!("total listings: {}", store.listing_count()?);
        }
    }

    Ok(())
}
