//! Batch enrichment of scraped listings.
//!
//! Date, price and room counts are parsed per record. Coordinates come from
//! one geocoding lookup per distinct address; lookups run concurrently up to
//! a fixed limit and are merged back by position, so output order always
//! matches input order. Any failed lookup leaves only that address without
//! coordinates.

use crate::error::GeocodeError;
use crate::geocoder::Geocoder;
use crate::models::{Coordinates, NormalizedRecord, ScrapedListing};
use crate::scraper::cleaner::{address_key, parse_count, parse_price, parse_sold_date};
use crate::utils::{CancelFlag, fmt_rate};
use chrono::{NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeStats {
    pub records: usize,
    pub distinct_addresses: usize,
    pub geocode_hits: usize,
    pub geocode_misses: usize,
    pub unparsed_dates: usize,
    pub unparsed_prices: usize,
}

/// Absent-value counts per field across a dataset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldCoverage {
    pub total: usize,
    pub address: usize,
    pub sold_date: usize,
    pub price: usize,
    pub beds: usize,
    pub baths: usize,
    pub garages: usize,
    pub property_type: usize,
    pub coordinates: usize,
}

impl FieldCoverage {
    pub fn measure(records: &[NormalizedRecord]) -> Self {
        let mut c = FieldCoverage {
            total: records.len(),
            ..Default::default()
        };
        for r in records {
            c.address += r.raw.address.is_none() as usize;
            c.sold_date += r.sold_date.is_none() as usize;
            c.price += r.price.is_none() as usize;
            c.beds += r.beds.is_none() as usize;
            c.baths += r.baths.is_none() as usize;
            c.garages += r.garages.is_none() as usize;
            c.property_type += r.raw.property_type.is_none() as usize;
            c.coordinates += r.coordinates.is_none() as usize;
        }
        c
    }

    pub fn log(&self) {
        info!("Absent fields over {} records:", self.total);
        for (name, absent) in [
            ("address", self.address),
            ("sold date", self.sold_date),
            ("price", self.price),
            ("beds", self.beds),
            ("baths", self.baths),
            ("garages", self.garages),
            ("property type", self.property_type),
            ("coordinates", self.coordinates),
        ] {
            info!("  {:<14} {}", name, fmt_rate(absent, self.total));
        }
    }
}

pub struct Normalizer {
    geocoder: Option<Arc<dyn Geocoder>>,
    concurrency: usize,
    lookup_timeout: Duration,
    cancel: CancelFlag,
}

impl Normalizer {
    pub fn new(geocoder: Arc<dyn Geocoder>, concurrency: usize, lookup_timeout: Duration) -> Self {
        Self {
            geocoder: Some(geocoder),
            concurrency: concurrency.max(1),
            lookup_timeout,
            cancel: CancelFlag::new(),
        }
    }

    /// Parses fields only; every record gets absent coordinates.
    pub fn without_geocoding() -> Self {
        Self {
            geocoder: None,
            concurrency: 1,
            lookup_timeout: Duration::ZERO,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn normalize(
        &self,
        listings: Vec<ScrapedListing>,
    ) -> (Vec<NormalizedRecord>, NormalizeStats) {
        let now = Utc::now().naive_utc();
        let keys: Vec<Option<String>> = listings
            .iter()
            .map(|l| l.record.address.as_deref().and_then(address_key))
            .collect();

        let located = self.geocode_all(&keys).await;

        let mut stats = NormalizeStats {
            records: listings.len(),
            distinct_addresses: located.len(),
            ..Default::default()
        };

        let records: Vec<NormalizedRecord> = listings
            .into_iter()
            .zip(keys)
            .map(|(listing, key)| {
                let coordinates = key.and_then(|k| located.get(&k).copied().flatten());
                normalize_one(listing, coordinates, now)
            })
            .collect();

        for r in &records {
            if r.coordinates.is_some() {
                stats.geocode_hits += 1;
            } else {
                stats.geocode_misses += 1;
            }
            if r.sold_date.is_none() && r.raw.sold_date_text.is_some() {
                stats.unparsed_dates += 1;
            }
            if r.price.is_none() && r.raw.price_text.is_some() {
                stats.unparsed_prices += 1;
            }
        }

        info!(
            "Normalized {} records: {} geocoded, {} without coordinates, {} distinct addresses",
            stats.records, stats.geocode_hits, stats.geocode_misses, stats.distinct_addresses
        );
        if stats.unparsed_dates > 0 || stats.unparsed_prices > 0 {
            warn!(
                "{} sold dates and {} prices could not be parsed",
                stats.unparsed_dates, stats.unparsed_prices
            );
        }

        (records, stats)
    }

    /// One lookup per distinct key. Every key is present in the result,
    /// mapped to `None` when its lookup failed, timed out or was cancelled.
    async fn geocode_all(&self, keys: &[Option<String>]) -> HashMap<String, Option<Coordinates>> {
        let mut distinct: Vec<String> = Vec::new();
        let mut located: HashMap<String, Option<Coordinates>> = HashMap::new();
        for key in keys.iter().flatten() {
            if !located.contains_key(key) {
                located.insert(key.clone(), None);
                distinct.push(key.clone());
            }
        }

        let Some(geocoder) = &self.geocoder else {
            return located;
        };

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for address in distinct {
            let geocoder = Arc::clone(geocoder);
            let sem = Arc::clone(&sem);
            let cancel = self.cancel.clone();
            let limit = self.lookup_timeout;
            let key = address.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                match lookup(geocoder.as_ref(), &address, limit).await {
                    Ok(Some(coords)) => Some(coords),
                    Ok(None) => {
                        debug!("No geocode match for {:?}", address);
                        None
                    }
                    Err(e) => {
                        warn!("Geocoding {:?} failed: {}", address, e);
                        None
                    }
                }
            });

            handles.push((key, handle));
        }

        for (key, handle) in handles {
            match handle.await {
                Ok(coords) => {
                    located.insert(key, coords);
                }
                Err(e) => error!("Geocode task panic for {:?}: {}", key, e),
            }
        }

        if self.cancel.is_cancelled() {
            warn!("Geocoding cancelled; remaining addresses left without coordinates");
        }

        located
    }
}

async fn lookup(
    geocoder: &dyn Geocoder,
    address: &str,
    limit: Duration,
) -> Result<Option<Coordinates>, GeocodeError> {
    tokio::time::timeout(limit, geocoder.geocode(address))
        .await
        .map_err(|_| GeocodeError::Timeout(limit))?
}

fn normalize_one(
    listing: ScrapedListing,
    coordinates: Option<Coordinates>,
    now: NaiveDateTime,
) -> NormalizedRecord {
    let raw = listing.record;
    NormalizedRecord {
        sold_date: raw.sold_date_text.as_deref().and_then(parse_sold_date),
        price: raw.price_text.as_deref().and_then(parse_price),
        beds: raw.beds.as_deref().and_then(parse_count),
        baths: raw.baths.as_deref().and_then(parse_count),
        garages: raw.garages.as_deref().and_then(parse_count),
        coordinates,
        query: listing.query,
        page: listing.page,
        raw,
        scraped_at: now,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeocodeError;
    use crate::models::{RawListingRecord, SuburbQuery};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Resolves every address except those listed as failing.
    #[derive(Default)]
    struct StubGeocoder {
        failing: HashSet<String>,
        unknown: HashSet<String>,
        slow: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
            self.calls.lock().unwrap().push(address.to_string());
            if self.slow.contains(address) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.failing.contains(address) {
                return Err(GeocodeError::Status(503));
            }
            if self.unknown.contains(address) {
                return Ok(None);
            }
            let n = address.len() as f64;
            Ok(Some(Coordinates {
                latitude: -35.0 - n / 1000.0,
                longitude: 149.0 + n / 1000.0,
            }))
        }
    }

    fn listing(address: &str, sold: &str, price: &str) -> ScrapedListing {
        ScrapedListing {
            query: SuburbQuery::new("Weston Creek", 2611, "ACT"),
            page: 1,
            record: RawListingRecord {
                address: Some(address.to_string()),
                sold_date_text: Some(sold.to_string()),
                price_text: Some(price.to_string()),
                beds: Some("3".to_string()),
                baths: Some("2".to_string()),
                garages: None,
                property_type: Some("House".to_string()),
            },
        }
    }

    fn ten_listings() -> Vec<ScrapedListing> {
        (1..=10)
            .map(|i| listing(&format!("{} Liardet Street, Weston ACT 2611", i), "Sold on 1 Dec 2023", "$900,000"))
            .collect()
    }

    fn normalizer(geocoder: Arc<StubGeocoder>) -> Normalizer {
        Normalizer::new(geocoder, 3, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_failed_lookups_only_blank_their_records() {
        let listings = ten_listings();
        let geocoder = Arc::new(StubGeocoder {
            failing: HashSet::from(["3 Liardet Street, Weston ACT 2611".to_string()]),
            unknown: HashSet::from(["7 Liardet Street, Weston ACT 2611".to_string()]),
            ..Default::default()
        });

        let (records, stats) = normalizer(geocoder).normalize(listings).await;

        assert_eq!(records.len(), 10);
        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.coordinates.is_none())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(missing, vec![2, 6]);
        assert_eq!(stats.geocode_hits, 8);
        assert_eq!(stats.geocode_misses, 2);
        // everything else still parsed
        assert!(records.iter().all(|r| r.price == Some(900_000)));
        assert!(records.iter().all(|r| r.sold_date == NaiveDate::from_ymd_opt(2023, 12, 1)));
    }

    #[tokio::test]
    async fn test_output_order_matches_input() {
        let listings = ten_listings();
        let addresses: Vec<Option<String>> =
            listings.iter().map(|l| l.record.address.clone()).collect();

        let (records, _) = normalizer(Arc::new(StubGeocoder::default()))
            .normalize(listings)
            .await;

        let out: Vec<Option<String>> = records.iter().map(|r| r.raw.address.clone()).collect();
        assert_eq!(out, addresses);
    }

    #[tokio::test]
    async fn test_repeated_addresses_are_looked_up_once() {
        let listings = vec![
            listing("6 Ainsworth Street, Chapman ACT 2611", "Sold on 5 Jan 2024", "$1,395,000"),
            listing("6  Ainsworth Street,  Chapman ACT 2611 ", "Sold on 2 Mar 2019", "$820,000"),
            listing("2 Bramble Place, Duffy ACT 2611", "Sold on 8 Dec 2023", "$875,000"),
        ];
        let geocoder = Arc::new(StubGeocoder::default());

        let (records, stats) = normalizer(geocoder.clone()).normalize(listings).await;

        assert_eq!(geocoder.calls.lock().unwrap().len(), 2);
        assert_eq!(stats.distinct_addresses, 2);
        assert_eq!(records[0].coordinates, records[1].coordinates);
        assert!(records[0].coordinates.is_some());
    }

    #[tokio::test]
    async fn test_malformed_values_become_absent() {
        let mut odd = listing("1 Odd Street, Rivett ACT 2611", "Sold recently", "Contact agent");
        odd.record.beds = Some("".to_string());
        odd.record.address = None;

        let (records, stats) = normalizer(Arc::new(StubGeocoder::default()))
            .normalize(vec![odd])
            .await;

        let r = &records[0];
        assert_eq!(r.sold_date, None);
        assert_eq!(r.price, None);
        assert_eq!(r.beds, None);
        assert_eq!(r.baths, Some(2));
        assert_eq!(r.coordinates, None);
        assert_eq!(stats.unparsed_dates, 1);
        assert_eq!(stats.unparsed_prices, 1);
        assert_eq!(stats.distinct_addresses, 0);
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let slow = "9 Slow Street, Weston ACT 2611".to_string();
        let geocoder = Arc::new(StubGeocoder {
            slow: HashSet::from([slow.clone()]),
            ..Default::default()
        });
        let listings = vec![
            listing(&slow, "Sold on 1 Dec 2023", "$1"),
            listing("10 Fast Street, Weston ACT 2611", "Sold on 1 Dec 2023", "$1"),
        ];

        let (records, _) = Normalizer::new(geocoder, 2, Duration::from_millis(50))
            .normalize(listings)
            .await;

        assert!(records[0].coordinates.is_none());
        assert!(records[1].coordinates.is_some());
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_a_geocode_error() {
        let slow = "9 Slow Street, Weston ACT 2611".to_string();
        let geocoder = StubGeocoder {
            slow: HashSet::from([slow.clone()]),
            ..Default::default()
        };
        let limit = Duration::from_millis(20);

        let err = tokio_test::assert_err!(lookup(&geocoder, &slow, limit).await);
        assert!(matches!(err, GeocodeError::Timeout(d) if d == limit));

        let found = tokio_test::assert_ok!(lookup(&geocoder, "1 Quick Street, Weston ACT 2611", limit).await);
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_run_keeps_every_record() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let geocoder = Arc::new(StubGeocoder::default());

        let (records, _) = normalizer(geocoder.clone())
            .with_cancel(cancel)
            .normalize(ten_listings())
            .await;

        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.coordinates.is_none() && r.price.is_some()));
        assert!(geocoder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_without_geocoding() {
        let (records, stats) = Normalizer::without_geocoding().normalize(ten_listings()).await;
        assert_eq!(records.len(), 10);
        assert_eq!(stats.geocode_hits, 0);
        assert!(records.iter().all(|r| r.coordinates.is_none()));
    }

    #[tokio::test]
    async fn test_field_coverage() {
        let (records, _) = Normalizer::without_geocoding().normalize(ten_listings()).await;
        let coverage = FieldCoverage::measure(&records);
        assert_eq!(coverage.total, 10);
        assert_eq!(coverage.garages, 10);
        assert_eq!(coverage.coordinates, 10);
        assert_eq!(coverage.price, 0);
        assert_eq!(coverage.address, 0);
    }
}
