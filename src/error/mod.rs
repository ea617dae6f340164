//! Typed failures at the two external boundaries: page fetches and geocoding.
//!
//! Both are always recoverable. Callers turn them into a skipped page,
//! a skipped suburb or absent coordinates.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },

    #[error("could not read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Transport errors, timeouts, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Body { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("geocoder returned HTTP {0}")]
    Status(u16),

    #[error("could not decode geocoder response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid coordinate {value:?}")]
    InvalidCoordinate { value: String },

    #[error("geocoding timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid geocoder url: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |s| FetchError::Status { url: "u".into(), status: s };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());

        let timeout = FetchError::Timeout { url: "u".into(), elapsed: Duration::from_secs(1) };
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_display_mentions_url() {
        let e = FetchError::Status { url: "https://x/1/".into(), status: 500 };
        assert_eq!(e.to_string(), "https://x/1/ returned HTTP 500");
    }
}
