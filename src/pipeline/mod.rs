//! Pipeline orchestrator: ties paginator → normalizer → storage together.
//!
//! ## Stages
//!
//! 1. Walk every results page of every suburb, collecting raw listings.
//! 2. Parse dates, prices and counts; geocode each distinct address.
//! 3. Append the run to DuckDB and write the CSV dataset.
//!
//! A cancelled run still goes through stages 2 and 3 with whatever stage 1
//! collected.

use crate::config::AppConfig;
use crate::geocoder::{Geocoder, NominatimGeocoder};
use crate::models::{NormalizedRecord, SuburbQuery};
use crate::normalizer::{FieldCoverage, NormalizeStats, Normalizer};
use crate::scraper::{HttpPageSource, PageSource, Paginator, ScrapeStats};
use crate::storage::Repository;
use crate::{export, utils::CancelFlag};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-invocation switches layered over the loaded config.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub geocode: bool,
    pub store: bool,
    pub csv_path: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            geocode: true,
            store: true,
            csv_path: None,
        }
    }
}

pub struct Pipeline {
    config: AppConfig,
    source: Arc<dyn PageSource>,
    geocoder: Option<Arc<dyn Geocoder>>,
    options: RunOptions,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: AppConfig, options: RunOptions) -> Result<Self> {
        let source: Arc<dyn PageSource> = Arc::new(
            HttpPageSource::new(&config.scraper).context("Failed to build page source")?,
        );
        let geocoder: Option<Arc<dyn Geocoder>> = if options.geocode && config.geocoder.enabled {
            Some(Arc::new(
                NominatimGeocoder::new(&config.geocoder).context("Failed to build geocoder")?,
            ))
        } else {
            None
        };
        Ok(Self::with_collaborators(config, options, source, geocoder))
    }

    pub fn with_collaborators(
        config: AppConfig,
        options: RunOptions,
        source: Arc<dyn PageSource>,
        geocoder: Option<Arc<dyn Geocoder>>,
    ) -> Self {
        Self {
            config,
            source,
            geocoder,
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, queries: &[SuburbQuery]) -> Result<PipelineStats> {
        let paginator = Paginator::from_config(Arc::clone(&self.source), &self.config.scraper)?
            .with_cancel(self.cancel.clone());

        let repo = if self.options.store {
            let repo = Repository::open(&self.config.storage.db_path)
                .context("Failed to open DuckDB")?;
            if self.config.storage.run_migrations {
                repo.run_migrations()?;
            }
            Some(repo)
        } else {
            None
        };

        // Everything after this point reports back through finish_scrape_run.
        let run_id = match &repo {
            Some(repo) => Some(repo.begin_scrape_run()?),
            None => None,
        };

        // ── 1. Pages ──────────────────────────────────────────────────────────
        info!("=== Step 1: Scraping {} suburbs ===", queries.len());
        let outcome = paginator.run(queries).await;

        // ── 2. Enrichment ─────────────────────────────────────────────────────
        info!("=== Step 2: Normalizing {} listings ===", outcome.listings.len());
        let normalizer = match &self.geocoder {
            Some(geocoder) => Normalizer::new(
                Arc::clone(geocoder),
                self.config.geocoder.concurrency,
                self.config.geocoder.timeout(),
            ),
            None => {
                info!("Geocoding disabled; coordinates will be empty");
                Normalizer::without_geocoding()
            }
        }
        .with_cancel(self.cancel.clone());
        let (records, normalize) = normalizer.normalize(outcome.listings).await;

        let coverage = FieldCoverage::measure(&records);
        coverage.log();

        // ── 3. Output ─────────────────────────────────────────────────────────
        info!("=== Step 3: Writing {} records ===", records.len());
        let mut stored = 0;
        let written = self.write(repo.as_ref().zip(run_id), &records, &mut stored);

        if let (Some(repo), Some(run_id)) = (&repo, run_id) {
            let error = written.as_ref().err().map(|e| format!("{:#}", e));
            repo.finish_scrape_run(run_id, &outcome.stats, stored, error.as_deref())?;
        }
        let exported = written?;

        let stats = PipelineStats {
            scrape: outcome.stats,
            normalize,
            coverage,
            stored,
            exported,
        };

        info!(
            "=== Done: {} records | {} suburbs skipped | {} pages failed | {} geocoded ===",
            stats.normalize.records,
            stats.scrape.suburbs_skipped,
            stats.scrape.pages_failed,
            stats.normalize.geocode_hits,
        );
        if stats.scrape.cancelled {
            warn!("Run was cancelled; dataset is partial");
        }

        Ok(stats)
    }

    /// Appends to DuckDB (when a run is open) and then writes the CSV.
    /// `stored` is set as soon as the insert commits.
    fn write(
        &self,
        run: Option<(&Repository, i64)>,
        records: &[NormalizedRecord],
        stored: &mut usize,
    ) -> Result<usize> {
        if let Some((repo, run_id)) = run {
            *stored = repo.insert_listings(run_id, records)?;
        }

        let csv_path = self
            .options
            .csv_path
            .clone()
            .unwrap_or_else(|| self.config.storage.csv_path.clone());
        export::export_csv(&csv_path, records)
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub scrape: ScrapeStats,
    pub normalize: NormalizeStats,
    pub coverage: FieldCoverage,
    pub stored: usize,
    pub exported: usize,
}
