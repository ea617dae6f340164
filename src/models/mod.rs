use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Scrape target ─────────────────────────────────────────────────────────────

/// One suburb to harvest: name, postcode and state code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuburbQuery {
    pub suburb: String,
    pub postcode: u32,
    pub state: String,
}

impl SuburbQuery {
    pub fn new(suburb: impl Into<String>, postcode: u32, state: impl Into<String>) -> Self {
        Self {
            suburb: suburb.into(),
            postcode,
            state: state.into(),
        }
    }
}

impl std::fmt::Display for SuburbQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.suburb, self.state, self.postcode)
    }
}

// ── Extracted listing ─────────────────────────────────────────────────────────

/// Loosely-typed fields of one listing as found in the markup.
///
/// Every field is always present; `None` means the element was not found,
/// `Some("")` means it was found but empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawListingRecord {
    pub address: Option<String>,
    pub sold_date_text: Option<String>,
    pub price_text: Option<String>,
    pub beds: Option<String>,
    pub baths: Option<String>,
    pub garages: Option<String>,
    pub property_type: Option<String>,
}

/// Records parsed from one results page plus the banner's listing count.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub listing_count: Option<u32>,
    pub records: Vec<RawListingRecord>,
}

/// A raw record tagged with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedListing {
    pub query: SuburbQuery,
    pub page: u32,
    pub record: RawListingRecord,
}

// ── Enriched listing ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub query: SuburbQuery,
    pub page: u32,
    pub raw: RawListingRecord,
    pub sold_date: Option<NaiveDate>,
    pub price: Option<i64>,
    pub beds: Option<u32>,
    pub baths: Option<u32>,
    pub garages: Option<u32>,
    pub coordinates: Option<Coordinates>,
    pub scraped_at: NaiveDateTime,
}

impl NormalizedRecord {
    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.longitude)
    }
}

// ── Tabular output row ────────────────────────────────────────────────────────

/// Column layout of the exported dataset. Absent values serialize as empty cells.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetRow {
    #[serde(rename = "Address")]
    pub address: Option<String>,
    #[serde(rename = "Sold Date")]
    pub sold_date: Option<NaiveDate>,
    #[serde(rename = "Price")]
    pub price: Option<i64>,
    #[serde(rename = "Beds")]
    pub beds: Option<u32>,
    #[serde(rename = "Baths")]
    pub baths: Option<u32>,
    #[serde(rename = "Garages")]
    pub garages: Option<u32>,
    #[serde(rename = "Property Type")]
    pub property_type: Option<String>,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
    #[serde(rename = "Sold Year")]
    pub sold_year: Option<i32>,
    #[serde(rename = "Suburb")]
    pub suburb: String,
    #[serde(rename = "Postcode")]
    pub postcode: u32,
    #[serde(rename = "State")]
    pub state: String,
}

impl From<&NormalizedRecord> for DatasetRow {
    fn from(r: &NormalizedRecord) -> Self {
        Self {
            address: r.raw.address.clone(),
            sold_date: r.sold_date,
            price: r.price,
            beds: r.beds,
            baths: r.baths,
            garages: r.garages,
            property_type: r.raw.property_type.clone(),
            latitude: r.latitude(),
            longitude: r.longitude(),
            sold_year: r.sold_date.map(|d| d.year()),
            suburb: r.query.suburb.clone(),
            postcode: r.query.postcode,
            state: r.query.state.clone(),
        }
    }
}
