mod config;
mod error;
mod export;
mod geocoder;
mod models;
mod normalizer;
mod pipeline;
mod scraper;
mod storage;
mod suburbs;
mod utils;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, RunOptions};
use crate::storage::Repository;
use crate::utils::CancelFlag;

#[derive(Parser)]
#[command(name = "sold-etl", about = "Sold property listings ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape sold listings, enrich them and write the dataset
    Scrape {
        /// State code used in listing URLs
        #[arg(long, default_value = suburbs::DEFAULT_STATE)]
        state: String,

        /// Suburb to scrape (repeatable); defaults to Weston Creek
        #[arg(short, long = "suburb")]
        suburbs: Vec<String>,

        /// Scrape every suburb in the built-in table
        #[arg(long, conflicts_with = "suburbs")]
        all: bool,

        /// Skip address → coordinate lookups
        #[arg(long)]
        no_geocode: bool,

        /// Do not write to DuckDB
        #[arg(long)]
        no_store: bool,

        /// CSV output path (default from config)
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// List the built-in suburb table
    Suburbs,

    /// Show database statistics
    Stats,

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "sold_etl=info,warn",
        1 => "sold_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { state, suburbs: names, all, no_geocode, no_store, csv } => {
            let _t = utils::Timer::start("Scrape");

            let queries = if all {
                suburbs::all(&state)
            } else {
                let names = if names.is_empty() { vec!["Weston Creek".to_string()] } else { names };
                match suburbs::resolve(&names, &state) {
                    Ok(q) => q,
                    Err(unknown) => bail!("Unknown suburbs: {}", unknown.join(", ")),
                }
            };

            let cancel = CancelFlag::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl-C received, stopping after the current step");
                    on_signal.cancel();
                }
            });

            let options = RunOptions {
                geocode: !no_geocode,
                store: !no_store,
                csv_path: csv,
            };
            let stats = Pipeline::new(config, options)?
                .with_cancel(cancel)
                .run(&queries)
                .await?;

            info!(
                "Done: {} suburbs, {} records, {} pages failed, {} stored, {} exported",
                stats.scrape.suburbs_requested,
                stats.normalize.records,
                stats.scrape.pages_failed,
                stats.stored,
                stats.exported
            );
        }

        Command::Suburbs => {
            println!("{} suburbs:", suburbs::ACT_SUBURBS.len());
            for (name, postcode) in suburbs::ACT_SUBURBS {
                println!("  {:<18} {}", name, postcode);
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let s = repo.summary()?;
            println!("─────────────────────────────────");
            println!("  Sold listings: Database Stats");
            println!("─────────────────────────────────");
            println!("  Listings : {}", utils::fmt_number(s.listings));
            println!("  Suburbs  : {}", utils::fmt_number(s.suburbs));
            println!("  Runs     : {}", utils::fmt_number(s.runs));
            println!("  Geocoded : {}", utils::fmt_rate(s.geocoded as usize, s.listings as usize));
            println!("  From     : {}", s.first_sold.map(|d| d.to_string()).unwrap_or("-".into()));
            println!("  To       : {}", s.last_sold.map(|d| d.to_string()).unwrap_or("-".into()));
            println!("─────────────────────────────────");
            for (suburb, n) in repo.suburb_counts()? {
                println!("  {:<18} {}", suburb, utils::fmt_number(n));
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
