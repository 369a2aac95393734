mod config;
mod error;
mod import;
mod models;
mod numbers;
mod orchestrator;
mod output;
mod scrapers;
mod store;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Settings;
use import::{import_file, HttpSink};
use orchestrator::Orchestrator;
use scrapers::ChromeLauncher;
use std::path::PathBuf;
use store::{ArtifactStore, FileFilter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "listing-scout", about = "Crawl divar.ir listings into JSON files")]
struct Cli {
    /// Settings file (JSON); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the configured cities and listing types
    Crawl {
        /// City to crawl (repeatable); all configured cities when omitted
        #[arg(long = "city")]
        cities: Vec<String>,
        /// Listing type to crawl (repeatable)
        #[arg(long = "type")]
        listing_types: Vec<String>,
        #[arg(long)]
        max_ads: Option<usize>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// List output files, newest first
    Files {
        #[arg(long = "type")]
        file_type: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a page of records from one output file
    Show {
        name: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        search: Option<String>,
    },
    /// Totals over the output directory
    Stats,
    /// Delete an output file
    Delete { name: String },
    /// Send the records of an output file to the backend
    Import {
        name: String,
        /// Backend base URL, overrides settings and SCOUT_BACKEND_URL
        #[arg(long)]
        backend: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    let store = ArtifactStore::new(&settings.output_dir, &settings.file_prefix);

    match cli.command {
        Command::Crawl {
            cities,
            listing_types,
            max_ads,
            headed,
        } => {
            if headed {
                settings.identity.headless = false;
            }
            crawl(&settings, &cities, &listing_types, max_ads).await?;
        }
        Command::Files {
            file_type,
            city,
            page,
            limit,
        } => {
            let filter = FileFilter { file_type, city };
            let listing = store.list_files(&filter, page, limit).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Show {
            name,
            page,
            limit,
            search,
        } => {
            let content = store
                .file_content(&name, page, limit, search.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&content)?);
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Delete { name } => {
            store.delete_file(&name).await?;
        }
        Command::Import { name, backend } => {
            let backend = backend
                .or(settings.backend_url.clone())
                .context("No backend URL: pass --backend or set SCOUT_BACKEND_URL")?;
            let sink = HttpSink::new(&backend)?;
            let summary = import_file(&store, &name, &sink).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

async fn crawl(
    settings: &Settings,
    cities: &[String],
    listing_types: &[String],
    max_ads: Option<usize>,
) -> Result<()> {
    let config = settings.select(cities, listing_types, max_ads)?;

    info!("🏠 Listing Scout - divar.ir crawler");
    info!("===================================");
    info!(
        "Cities: {}",
        config
            .cities
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!(
        "Types: {}",
        config
            .listing_types
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("Max ads per type: {}", config.max_per_type);

    let orchestrator = Orchestrator::new(
        ChromeLauncher,
        settings.identity.clone(),
        config.output_dir.clone(),
    );
    orchestrator.start(config)?;

    let waiter = orchestrator.clone();
    let mut run = tokio::task::spawn_blocking(move || waiter.wait());

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping after the current listing");
            orchestrator.stop();
            run.await
        }
    }
    .context("Crawl worker task failed")?;

    let report = outcome.context("Crawl run was not started")??;

    info!("");
    info!(
        "✅ Extracted {} listings ({} skipped){}",
        report.extracted,
        report.skipped,
        if report.stopped { ", stopped early" } else { "" }
    );
    for (pair, count) in &report.totals_by_pair {
        info!("   {pair}: {count}");
    }
    for path in &report.artifacts {
        info!("💾 {}", path.display());
    }

    Ok(())
}
