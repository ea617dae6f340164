use crate::models::NormalizedRecord;
use crate::scraper::ScrapeStats;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{Connection, params};
use std::path::Path;
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS scrape_run_ids START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('scrape_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    suburbs_requested   INTEGER DEFAULT 0,
    suburbs_skipped     INTEGER DEFAULT 0,
    pages_fetched       INTEGER DEFAULT 0,
    pages_failed        INTEGER DEFAULT 0,
    listings_inserted   INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS sold_listings (
    run_id          INTEGER  NOT NULL,
    suburb          VARCHAR  NOT NULL,
    postcode        INTEGER  NOT NULL,
    state           VARCHAR  NOT NULL,
    page            INTEGER  NOT NULL,
    -- Text as found on the page; NULL when the element was missing
    address         VARCHAR,
    sold_date_text  VARCHAR,
    price_text      VARCHAR,
    beds_text       VARCHAR,
    baths_text      VARCHAR,
    garages_text    VARCHAR,
    property_type   VARCHAR,
    -- Parsed values; NULL when missing or unparseable
    sold_date       DATE,
    price           BIGINT,
    beds            INTEGER,
    baths           INTEGER,
    garages         INTEGER,
    latitude        DOUBLE,
    longitude       DOUBLE,
    scraped_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_listings_suburb    ON sold_listings (suburb);
CREATE INDEX IF NOT EXISTS idx_listings_sold_date ON sold_listings (sold_date);
CREATE INDEX IF NOT EXISTS idx_listings_run       ON sold_listings (run_id);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DatasetSummary {
    pub listings: i64,
    pub suburbs: i64,
    pub runs: i64,
    pub geocoded: i64,
    pub first_sold: Option<NaiveDate>,
    pub last_sold: Option<NaiveDate>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Listings ──────────────────────────────────────────────────────────────

    /// Append one run's records. Listings are never merged across runs.
    pub fn insert_listings(&self, run_id: i64, records: &[NormalizedRecord]) -> Result<usize> {
        if records.is_empty() { return Ok(0); }

        let tx = self.conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO sold_listings
                (run_id, suburb, postcode, state, page,
                 address, sold_date_text, price_text, beds_text, baths_text, garages_text, property_type,
                 sold_date, price, beds, baths, garages, latitude, longitude, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        for r in records {
            tx.execute(sql, params![
                run_id, r.query.suburb, r.query.postcode, r.query.state, r.page,
                r.raw.address, r.raw.sold_date_text, r.raw.price_text,
                r.raw.beds, r.raw.baths, r.raw.garages, r.raw.property_type,
                r.sold_date, r.price, r.beds, r.baths, r.garages,
                r.latitude(), r.longitude(),
                r.scraped_at,
            ]).with_context(|| format!("insert listing {:?}", r.raw.address))?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub fn listing_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM sold_listings")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn summary(&self) -> Result<DatasetSummary> {
        let mut s = self.conn.prepare(
            r#"SELECT COUNT(*),
                      COUNT(DISTINCT suburb),
                      COUNT(DISTINCT run_id),
                      COUNT(latitude),
                      MIN(sold_date),
                      MAX(sold_date)
               FROM sold_listings"#,
        )?;
        Ok(s.query_row([], |r| {
            Ok(DatasetSummary {
                listings: r.get(0)?,
                suburbs: r.get(1)?,
                runs: r.get(2)?,
                geocoded: r.get(3)?,
                first_sold: r.get(4)?,
                last_sold: r.get(5)?,
            })
        })?)
    }

    pub fn suburb_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT suburb, COUNT(*) FROM sold_listings GROUP BY suburb ORDER BY suburb",
        )?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(
        &self, run_id: i64, stats: &ScrapeStats, inserted: usize, error: Option<&str>,
    ) -> Result<()> {
        let status = match (error, stats.cancelled) {
            (Some(_), _) => "error",
            (None, true) => "cancelled",
            (None, false) => "success",
        };
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               suburbs_requested = ?, suburbs_skipped = ?,
               pages_fetched = ?, pages_failed = ?,
               listings_inserted = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                status,
                stats.suburbs_requested as i64, stats.suburbs_skipped as i64,
                stats.pages_fetched as i64, stats.pages_failed as i64,
                inserted as i64, error, run_id,
            ],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: i64) -> Result<Option<String>> {
        let mut s = self.conn.prepare("SELECT status FROM scrape_runs WHERE id = ?")?;
        let status: Option<String> = s.query_row(params![run_id], |r| r.get(0)).ok();
        Ok(status)
    }
}
