use crate::config::GeocoderConfig;
use crate::error::GeocodeError;
use crate::models::Coordinates;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

/// Address → coordinate lookup.
///
/// `Ok(None)` means the service answered but knows no such address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Nominatim search API response row
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// OpenStreetMap Nominatim geocoder.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    country_codes: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()
            .context("Failed to build geocoder HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            country_codes: config.country_codes.clone(),
        })
    }

    fn search_url(&self, address: &str) -> Result<Url, GeocodeError> {
        let mut params = vec![("q", address), ("format", "json"), ("limit", "1")];
        if !self.country_codes.is_empty() {
            params.push(("countrycodes", self.country_codes.as_str()));
        }
        Ok(Url::parse_with_params(&self.base_url, &params)?)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = self.search_url(address)?;

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        let places: Vec<NominatimPlace> = serde_json::from_str(&body)?;

        let Some(place) = places.first() else {
            debug!("No match");
            return Ok(None);
        };

        let coords = parse_place(place)?;
        debug!("→ ({}, {}) {}", coords.latitude, coords.longitude, place.display_name);
        Ok(Some(coords))
    }
}

fn parse_place(place: &NominatimPlace) -> Result<Coordinates, GeocodeError> {
    let latitude = parse_coordinate(&place.lat, 90.0)?;
    let longitude = parse_coordinate(&place.lon, 180.0)?;
    Ok(Coordinates { latitude, longitude })
}

fn parse_coordinate(s: &str, bound: f64) -> Result<f64, GeocodeError> {
    let invalid = || GeocodeError::InvalidCoordinate { value: s.to_string() };
    let value: f64 = s.trim().parse().map_err(|_| invalid())?;
    if value.is_finite() && value.abs() <= bound {
        Ok(value)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocoder() -> NominatimGeocoder {
        NominatimGeocoder::new(&GeocoderConfig::default()).unwrap()
    }

    #[test]
    fn test_search_url_encodes_address() {
        let url = geocoder().search_url("3/41 Mulley Street, Holder ACT 2611").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("nominatim.openstreetmap.org"));
        assert_eq!(url.path(), "/search");
        assert!(pairs.contains(&("q".into(), "3/41 Mulley Street, Holder ACT 2611".into())));
        assert!(pairs.contains(&("countrycodes".into(), "au".into())));
        assert!(pairs.contains(&("limit".into(), "1".into())));
    }

    #[test]
    fn test_parse_place() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"lat": "-35.3384", "lon": "149.0497", "display_name": "Chapman, ACT"}]"#,
        )
        .unwrap();
        let coords = parse_place(&places[0]).unwrap();
        assert_eq!(coords.latitude, -35.3384);
        assert_eq!(coords.longitude, 149.0497);
    }

    #[test]
    fn test_parse_coordinate_rejects_garbage() {
        assert!(parse_coordinate("abc", 90.0).is_err());
        assert!(parse_coordinate("95.0", 90.0).is_err());
        assert!(parse_coordinate("NaN", 90.0).is_err());
        assert_eq!(parse_coordinate(" -35.5 ", 90.0).unwrap(), -35.5);
    }

    #[test]
    fn test_empty_response_decodes() {
        let places: Vec<NominatimPlace> = serde_json::from_str("[]").unwrap();
        assert!(places.is_empty());
    }
}
