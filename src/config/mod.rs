use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Listing-site fetch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Extra attempts after the first one. 0 means a single attempt.
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pages of one suburb fetched at once after page 1.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
}

/// Address → coordinate lookup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    #[serde(default = "default_country_codes")]
    pub country_codes: String,

    #[serde(default = "default_geocoder_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_geocoder_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Upper bound on a single retry backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Wall-clock limit for one page fetch including delay and retries.
    pub fn call_budget(&self) -> Duration {
        let attempts = self.max_retries + 1;
        let delay = Duration::from_millis(self.request_delay_ms + self.jitter_ms);
        (self.timeout() + delay) * attempts + MAX_BACKOFF * self.max_retries
    }
}

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.auhouseprices.com/sold/".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "sold-listings-etl/0.1 (research project; sold price dataset)".to_string()
}
fn default_page_concurrency() -> usize {
    4
}
fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}
fn default_country_codes() -> String {
    "au".to_string()
}
fn default_geocoder_timeout_secs() -> u64 {
    10
}
fn default_geocoder_concurrency() -> usize {
    2
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/sold.duckdb")
}
fn default_csv_path() -> PathBuf {
    PathBuf::from("data/sold_listings.csv")
}
fn default_true() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: 0,
            user_agent: default_user_agent(),
            page_concurrency: default_page_concurrency(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_geocoder_url(),
            country_codes: default_country_codes(),
            timeout_secs: default_geocoder_timeout_secs(),
            concurrency: default_geocoder_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            csv_path: default_csv_path(),
            run_migrations: true,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SOLD").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), falling back to defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
