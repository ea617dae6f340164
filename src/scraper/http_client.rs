use crate::config::{MAX_BACKOFF, ScraperConfig};
use crate::error::FetchError;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text after a polite delay.
    ///
    /// Makes `max_retries` extra attempts on retryable failures, with
    /// jittered exponential backoff. With the default of 0 this is a single attempt.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1))
            .max_delay(MAX_BACKOFF)
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::start(
            strategy,
            || self.attempt(url),
            |e: &FetchError| {
                let retry = e.is_retryable() && self.config.max_retries > 0;
                if retry {
                    warn!("Retrying after: {}", e);
                }
                retry
            },
        )
        .await
    }

    async fn attempt(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await.map_err(|source| {
            if source.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    elapsed: self.config.timeout(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let extra = jitter(Duration::from_millis(self.config.jitter_ms));
        sleep(Duration::from_millis(self.config.request_delay_ms) + extra).await;
    }
}
