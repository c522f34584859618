//! Public IP and geo-IP lookups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::RecorderConfig;
use crate::error::{Error, Result};

/// What a geo-IP service reports about the caller.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeoInfo {
    /// City name.
    #[serde(default)]
    pub city: Option<String>,
    /// Region or state.
    #[serde(default)]
    pub region: Option<String>,
    /// Full country name.
    #[serde(default)]
    pub country_name: Option<String>,
    /// Country code.
    #[serde(default)]
    pub country: Option<String>,
    /// Approximate latitude.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Approximate longitude.
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl GeoInfo {
    /// `city, region, country`, skipping empty parts. `None` when all are empty.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        let country = non_empty(self.country_name.as_deref())
            .or_else(|| non_empty(self.country.as_deref()));
        let parts: Vec<&str> = [
            non_empty(self.city.as_deref()),
            non_empty(self.region.as_deref()),
            country,
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    /// `lat, lon (ip approx)` when both coordinates were reported.
    #[must_use]
    pub fn approx_coords(&self) -> Option<String> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(format!("{lat}, {lon} (ip approx)")),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Source of the visitor's public IP and approximate location.
#[async_trait]
pub trait IpGeoLookup: Send + Sync {
    /// The caller's public IP address.
    async fn public_ip(&self) -> Result<String>;

    /// Geo-IP information for the caller.
    async fn geo(&self) -> Result<GeoInfo>;
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    #[serde(default)]
    ip: Option<String>,
}

/// [`IpGeoLookup`] over HTTP JSON services.
#[derive(Debug, Clone)]
pub struct HttpLookup {
    http: Client,
    ip_url: String,
    geo_url: String,
}

impl HttpLookup {
    /// Lookup against the given services, each request bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        ip_url: impl Into<String>,
        geo_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            ip_url: ip_url.into(),
            geo_url: geo_url.into(),
        })
    }

    /// Lookup configured from `[recorder]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        Self::new(
            &config.ip_lookup_url,
            &config.geo_lookup_url,
            Duration::from_millis(config.lookup_timeout_ms),
        )
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    operation: format!("GET {url}"),
                }
            } else {
                Error::Http(e)
            }
        })?;
        if !response.status().is_success() {
            return Err(Error::api_status(url, response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl IpGeoLookup for HttpLookup {
    async fn public_ip(&self) -> Result<String> {
        let body: IpResponse = self.fetch(&self.ip_url).await?;
        let ip = non_empty(body.ip.as_deref())
            .ok_or_else(|| Error::remote_unavailable("ip lookup returned no address"))?;
        debug!(ip, "Public IP resolved");
        Ok(ip.to_string())
    }

    async fn geo(&self) -> Result<GeoInfo> {
        self.fetch(&self.geo_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_joins_present_parts() {
        let geo = GeoInfo {
            city: Some("Berlin".to_string()),
            region: Some(String::new()),
            country_name: Some("Germany".to_string()),
            country: Some("DE".to_string()),
            ..GeoInfo::default()
        };
        assert_eq!(geo.location().as_deref(), Some("Berlin, Germany"));
    }

    #[test]
    fn test_location_falls_back_to_country_code() {
        let geo = GeoInfo {
            country: Some("DE".to_string()),
            ..GeoInfo::default()
        };
        assert_eq!(geo.location().as_deref(), Some("DE"));
        assert_eq!(GeoInfo::default().location(), None);
    }

    #[test]
    fn test_approx_coords_needs_both() {
        let geo = GeoInfo {
            latitude: Some(52.52),
            longitude: Some(13.405),
            ..GeoInfo::default()
        };
        assert_eq!(
            geo.approx_coords().as_deref(),
            Some("52.52, 13.405 (ip approx)")
        );

        let half = GeoInfo {
            latitude: Some(52.52),
            ..GeoInfo::default()
        };
        assert_eq!(half.approx_coords(), None);
    }

    #[test]
    fn test_geo_info_parses_service_payload() {
        let geo: GeoInfo = serde_json::from_str(
            r#"{"ip":"1.2.3.4","city":"Lyon","region":"Auvergne","country_name":"France","latitude":45.75,"longitude":4.85,"org":"x"}"#,
        )
        .unwrap();
        assert_eq!(geo.location().as_deref(), Some("Lyon, Auvergne, France"));
    }

    #[tokio::test]
    async fn test_unreachable_lookup_fails() {
        let lookup = HttpLookup::new(
            "http://127.0.0.1:9/ip",
            "http://127.0.0.1:9/geo",
            Duration::from_millis(300),
        )
        .unwrap();
        assert!(lookup.public_ip().await.is_err());
        assert!(lookup.geo().await.is_err());
    }
}
