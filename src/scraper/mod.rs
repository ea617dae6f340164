pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::models::{RawListingRecord, ScrapedListing, SuburbQuery};
use crate::utils::CancelFlag;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use self::http_client::HttpClient;
use self::parsers::PageExtractor;

/// Listings rendered per results page.
pub const PAGE_SIZE: u32 = 12;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable page fetcher.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpPageSource {
    client: HttpClient,
}

impl HttpPageSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.client.get_text(url).await
    }
}

// ── URLs ──────────────────────────────────────────────────────────────────────

/// `{base}/list/{state}/{postcode}/{suburb}/{page}/`, spaces in the suburb
/// replaced with `+` and nothing else escaped.
pub fn build_url(base_url: &str, suburb: &str, postcode: u32, page: u32, state: &str) -> String {
    format!(
        "{}/list/{}/{}/{}/{}/",
        base_url.trim_end_matches('/'),
        state,
        postcode,
        suburb.replace(' ', "+"),
        page
    )
}

/// Pages needed for `listing_count` listings. Page 1 always counts.
pub fn page_count(listing_count: u32) -> u32 {
    listing_count.div_ceil(PAGE_SIZE).max(1)
}

async fn fetch_with_timeout(
    source: &dyn PageSource,
    url: &str,
    limit: Duration,
) -> Result<String, FetchError> {
    match tokio::time::timeout(limit, source.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            elapsed: limit,
        }),
    }
}

// ── Paginator ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScrapeStats {
    pub suburbs_requested: usize,
    pub suburbs_skipped: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub records: usize,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    /// Suburb order, then page order, then position on the page.
    pub listings: Vec<ScrapedListing>,
    pub stats: ScrapeStats,
}

/// Walks every results page of each suburb.
///
/// Page 1 is fetched alone because its banner decides how many pages exist.
/// The remaining pages are fetched concurrently and merged back in page order.
pub struct Paginator {
    source: Arc<dyn PageSource>,
    extractor: Arc<PageExtractor>,
    base_url: String,
    page_concurrency: usize,
    fetch_timeout: Duration,
    cancel: CancelFlag,
}

impl Paginator {
    pub fn new(
        source: Arc<dyn PageSource>,
        base_url: impl Into<String>,
        page_concurrency: usize,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            source,
            extractor: Arc::new(PageExtractor::new()?),
            base_url: base_url.into(),
            page_concurrency: page_concurrency.max(1),
            fetch_timeout,
            cancel: CancelFlag::new(),
        })
    }

    pub fn from_config(source: Arc<dyn PageSource>, config: &ScraperConfig) -> Result<Self> {
        Self::new(
            source,
            config.base_url.clone(),
            config.page_concurrency,
            config.call_budget(),
        )
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn url(&self, query: &SuburbQuery, page: u32) -> String {
        build_url(&self.base_url, &query.suburb, query.postcode, page, &query.state)
    }

    pub async fn run(&self, queries: &[SuburbQuery]) -> ScrapeOutcome {
        let mut listings = Vec::new();
        let mut stats = ScrapeStats {
            suburbs_requested: queries.len(),
            ..Default::default()
        };

        for query in queries {
            if self.cancel.is_cancelled() {
                warn!("Cancelled before {}; keeping {} listings", query, listings.len());
                stats.cancelled = true;
                break;
            }

            match self.scrape_suburb(query, &mut stats).await {
                Some(found) => {
                    info!(suburb = %query.suburb, "{} listings", found.len());
                    listings.extend(found);
                }
                None => stats.suburbs_skipped += 1,
            }
        }

        stats.records = listings.len();
        info!(
            "Scraped {} listings from {} suburbs ({} skipped), {} pages ok, {} pages failed",
            stats.records,
            stats.suburbs_requested,
            stats.suburbs_skipped,
            stats.pages_fetched,
            stats.pages_failed
        );

        ScrapeOutcome { listings, stats }
    }

    /// `None` when the suburb has to be skipped entirely.
    async fn scrape_suburb(
        &self,
        query: &SuburbQuery,
        stats: &mut ScrapeStats,
    ) -> Option<Vec<ScrapedListing>> {
        let first_url = self.url(query, 1);
        info!(suburb = %query.suburb, "Fetching page 1 ({})", first_url);

        let html = match fetch_with_timeout(self.source.as_ref(), &first_url, self.fetch_timeout).await
        {
            Ok(html) => html,
            Err(e) => {
                warn!(suburb = %query.suburb, "Skipping suburb, page 1 failed: {}", e);
                stats.pages_failed += 1;
                return None;
            }
        };
        stats.pages_fetched += 1;

        let first = self.extractor.extract(&html);
        let Some(listing_count) = first.listing_count else {
            warn!(suburb = %query.suburb, "Skipping suburb, no results banner on page 1");
            return None;
        };

        let total_pages = page_count(listing_count);
        info!(
            suburb = %query.suburb,
            "{} listings over {} pages", listing_count, total_pages
        );

        let mut listings = tag(query, 1, first.records);

        let sem = Arc::new(Semaphore::new(self.page_concurrency));
        let mut handles = Vec::new();

        for page in 2..=total_pages {
            let url = self.url(query, page);
            let source = Arc::clone(&self.source);
            let extractor = Arc::clone(&self.extractor);
            let sem = Arc::clone(&sem);
            let limit = self.fetch_timeout;

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;
                let html = fetch_with_timeout(source.as_ref(), &url, limit).await?;
                Ok::<Vec<RawListingRecord>, anyhow::Error>(extractor.extract(&html).records)
            });

            handles.push((page, handle));
        }

        for (page, handle) in handles {
            match handle.await {
                Ok(Ok(records)) => {
                    stats.pages_fetched += 1;
                    info!(suburb = %query.suburb, page, "{} listings", records.len());
                    listings.extend(tag(query, page, records));
                }
                Ok(Err(e)) => {
                    warn!(suburb = %query.suburb, page, "Skipping page: {:#}", e);
                    stats.pages_failed += 1;
                }
                Err(e) => {
                    error!(suburb = %query.suburb, page, "Task panic: {}", e);
                    stats.pages_failed += 1;
                }
            }
        }

        Some(listings)
    }
}

fn tag(query: &SuburbQuery, page: u32, records: Vec<RawListingRecord>) -> Vec<ScrapedListing> {
    records
        .into_iter()
        .map(|record| ScrapedListing {
            query: query.clone(),
            page,
            record,
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const BASE: &str = "https://www.auhouseprices.com/sold/";
    const PAGE_1: &str = include_str!("../../tests/fixtures/weston_creek_page1.html");
    const PAGE_2: &str = include_str!("../../tests/fixtures/weston_creek_page2.html");
    const NO_BANNER: &str = include_str!("../../tests/fixtures/no_banner.html");
    const EMPTY: &str = include_str!("../../tests/fixtures/empty_results.html");

    /// Serves fixtures by URL; anything else is a 404.
    #[derive(Default)]
    struct StubSource {
        pages: HashMap<String, &'static str>,
        fetched: Mutex<Vec<String>>,
        delay: Option<Duration>,
        cancel_on_fetch: Option<CancelFlag>,
    }

    impl StubSource {
        fn with_page(mut self, query: &SuburbQuery, page: u32, html: &'static str) -> Self {
            self.pages.insert(build_url(BASE, &query.suburb, query.postcode, page, &query.state), html);
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for StubSource {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.fetched.lock().unwrap().push(url.to_string());
            if let Some(flag) = &self.cancel_on_fetch {
                flag.cancel();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.pages
                .get(url)
                .map(|html| html.to_string())
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn weston_creek() -> SuburbQuery {
        SuburbQuery::new("Weston Creek", 2611, "ACT")
    }

    fn paginator(source: Arc<StubSource>) -> Paginator {
        Paginator::new(source, BASE, 4, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_url() {
        assert_eq!(
            build_url(BASE, "Weston Creek", 2611, 1, "ACT"),
            "https://www.auhouseprices.com/sold/list/ACT/2611/Weston+Creek/1/"
        );
        assert_eq!(
            build_url("https://example.com/sold", "Isabella Plains", 2905, 3, "ACT"),
            "https://example.com/sold/list/ACT/2905/Isabella+Plains/3/"
        );
        // only spaces are rewritten
        assert_eq!(
            build_url(BASE, "O'Connor", 2602, 2, "ACT"),
            "https://www.auhouseprices.com/sold/list/ACT/2602/O'Connor/2/"
        );
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(1), 1);
        assert_eq!(page_count(12), 1);
        assert_eq!(page_count(13), 2);
        assert_eq!(page_count(14), 2);
        assert_eq!(page_count(24), 2);
        assert_eq!(page_count(25), 3);
        assert_eq!(page_count(134), 12);
    }

    #[tokio::test]
    async fn test_weston_creek_two_pages() {
        let q = weston_creek();
        let source = Arc::new(
            StubSource::default()
                .with_page(&q, 1, PAGE_1)
                .with_page(&q, 2, PAGE_2),
        );

        let outcome = paginator(source.clone()).run(std::slice::from_ref(&q)).await;

        assert_eq!(source.fetched().len(), 2);
        assert_eq!(outcome.listings.len(), 14);
        assert_eq!(outcome.listings.iter().filter(|l| l.page == 2).count(), 2);
        assert!(outcome.listings[..12].iter().all(|l| l.page == 1));
        assert_eq!(
            outcome.stats,
            ScrapeStats {
                suburbs_requested: 1,
                suburbs_skipped: 0,
                pages_fetched: 2,
                pages_failed: 0,
                records: 14,
                cancelled: false,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_second_page_keeps_first() {
        let q = weston_creek();
        let source = Arc::new(StubSource::default().with_page(&q, 1, PAGE_1));

        let outcome = paginator(source.clone()).run(std::slice::from_ref(&q)).await;

        assert_eq!(source.fetched().len(), 2);
        assert_eq!(outcome.listings.len(), 12);
        assert_eq!(outcome.stats.pages_failed, 1);
        assert_eq!(outcome.stats.suburbs_skipped, 0);
    }

    #[tokio::test]
    async fn test_zero_listings_fetches_only_first_page() {
        let q = weston_creek();
        let source = Arc::new(StubSource::default().with_page(&q, 1, EMPTY));

        let outcome = paginator(source.clone()).run(std::slice::from_ref(&q)).await;

        assert_eq!(source.fetched().len(), 1);
        assert!(outcome.listings.is_empty());
        assert_eq!(outcome.stats.pages_fetched, 1);
        assert_eq!(outcome.stats.suburbs_skipped, 0);
    }

    #[tokio::test]
    async fn test_fetches_exactly_one_first_page_per_suburb_in_order() {
        let queries = vec![
            SuburbQuery::new("Weston Creek", 2611, "ACT"),
            SuburbQuery::new("Kambah", 2902, "ACT"),
            SuburbQuery::new("Red Hill", 2603, "ACT"),
        ];
        let source = Arc::new(
            StubSource::default()
                .with_page(&queries[0], 1, EMPTY)
                .with_page(&queries[1], 1, NO_BANNER)
                .with_page(&queries[2], 1, EMPTY),
        );

        let outcome = paginator(source.clone()).run(&queries).await;

        let expected: Vec<String> = queries
            .iter()
            .map(|q| build_url(BASE, &q.suburb, q.postcode, 1, &q.state))
            .collect();
        assert_eq!(source.fetched(), expected);
        assert_eq!(outcome.stats.suburbs_requested, 3);
    }

    #[tokio::test]
    async fn test_dataset_grouped_in_suburb_order() {
        let a = SuburbQuery::new("Weston Creek", 2611, "ACT");
        let b = SuburbQuery::new("Rivett", 2611, "ACT");
        let source = Arc::new(
            StubSource::default()
                .with_page(&a, 1, PAGE_1)
                .with_page(&a, 2, PAGE_2)
                .with_page(&b, 1, PAGE_2),
        );

        let outcome = paginator(source).run(&[a.clone(), b.clone()]).await;

        assert_eq!(outcome.listings.len(), 14 + 2);
        assert!(outcome.listings[..14].iter().all(|l| l.query == a));
        assert!(outcome.listings[14..].iter().all(|l| l.query == b));
        // page order inside the suburb, then page position
        let pages: Vec<u32> = outcome.listings[..14].iter().map(|l| l.page).collect();
        assert!(pages.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            outcome.listings[12].record.address.as_deref(),
            Some("2 Bramble Place, Duffy ACT 2611")
        );
    }

    #[tokio::test]
    async fn test_skipped_suburbs_do_not_stop_the_batch() {
        let missing = SuburbQuery::new("Hall", 2618, "ACT");
        let bannerless = SuburbQuery::new("Holt", 2615, "ACT");
        let good = weston_creek();
        let source = Arc::new(
            StubSource::default()
                .with_page(&bannerless, 1, NO_BANNER)
                .with_page(&good, 1, PAGE_1)
                .with_page(&good, 2, PAGE_2),
        );

        let outcome = paginator(source).run(&[missing, bannerless, good.clone()]).await;

        assert_eq!(outcome.stats.suburbs_skipped, 2);
        assert_eq!(outcome.listings.len(), 14);
        assert!(outcome.listings.iter().all(|l| l.query == good));
    }

    #[tokio::test]
    async fn test_slow_page_times_out() {
        let q = weston_creek();
        let source = Arc::new(StubSource {
            delay: Some(Duration::from_secs(5)),
            ..StubSource::default().with_page(&q, 1, PAGE_1)
        });
        let paginator = Paginator::new(source, BASE, 1, Duration::from_millis(50)).unwrap();

        let outcome = paginator.run(std::slice::from_ref(&q)).await;

        assert!(outcome.listings.is_empty());
        assert_eq!(outcome.stats.suburbs_skipped, 1);
        assert_eq!(outcome.stats.pages_failed, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_suburbs() {
        let cancel = CancelFlag::new();
        let first = weston_creek();
        let second = SuburbQuery::new("Kambah", 2902, "ACT");
        let source = Arc::new(StubSource {
            cancel_on_fetch: Some(cancel.clone()),
            ..StubSource::default()
                .with_page(&first, 1, PAGE_1)
                .with_page(&first, 2, PAGE_2)
                .with_page(&second, 1, PAGE_1)
        });

        let outcome = paginator(source.clone())
            .with_cancel(cancel)
            .run(&[first.clone(), second])
            .await;

        // the suburb in flight finishes, the next one never starts
        assert!(outcome.stats.cancelled);
        assert_eq!(outcome.listings.len(), 14);
        assert_eq!(source.fetched().len(), 2);
    }
}
