//! Best-effort geolocation of the clicking client.
//!
//! Lookups never block a click for long: callers go through
//! [`lookup_with_timeout`], and any failure or delay yields `None`.

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::GeoInfo;

/// How long a resolved location is reused
const GEO_CACHE_TTL_SECS: u64 = 15 * 60;
const GEO_CACHE_KEY: &str = "self";

#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Resolve the current client's coarse location
    async fn lookup(&self) -> Option<GeoInfo>;
}

/// Run `geo.lookup()` but give up after `timeout`
pub async fn lookup_with_timeout(geo: &dyn GeoLookup, timeout: Duration) -> Option<GeoInfo> {
    match tokio::time::timeout(timeout, geo.lookup()).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "geo lookup timed out");
            None
        }
    }
}

/// Response shape of ipapi.co-style "where am I" endpoints
#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    error: bool,
}

/// Geo lookup against a JSON HTTP endpoint describing the caller,
/// e.g. `https://ipapi.co/json/`. The answer, including a failed one,
/// is cached since it describes this process's own network location.
pub struct HttpGeoLookup {
    client: reqwest::Client,
    url: String,
    cache: Cache<&'static str, Option<GeoInfo>>,
}

impl HttpGeoLookup {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(GEO_CACHE_TTL_SECS))
            .build();

        Ok(Self {
            client,
            url: url.to_string(),
            cache,
        })
    }

    async fn fetch(&self) -> Option<GeoInfo> {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), url = %self.url, "geo lookup rejected");
                return None;
            }
            Err(e) => {
                warn!(error = %e, url = %self.url, "geo lookup failed");
                return None;
            }
        };

        match response.json::<GeoApiResponse>().await {
            Ok(body) if !body.error => Some(GeoInfo {
                country: body.country_name,
                city: body.city,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, url = %self.url, "geo lookup returned unreadable body");
                None
            }
        }
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self) -> Option<GeoInfo> {
        self.cache
            .get_with(GEO_CACHE_KEY, async { self.fetch().await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowLookup;

    #[async_trait]
    impl GeoLookup for SlowLookup {
        async fn lookup(&self) -> Option<GeoInfo> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Some(GeoInfo::default())
        }
    }

    struct FixedLookup;

    #[async_trait]
    impl GeoLookup for FixedLookup {
        async fn lookup(&self) -> Option<GeoInfo> {
            Some(GeoInfo {
                country: Some("Chile".to_string()),
                city: Some("Santiago".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_yields_none() {
        let result = lookup_with_timeout(&SlowLookup, Duration::from_millis(20)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_fast_lookup_passes_through() {
        let result = lookup_with_timeout(&FixedLookup, Duration::from_secs(1)).await;
        assert_eq!(result.unwrap().city.as_deref(), Some("Santiago"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_none() {
        let geo = HttpGeoLookup::new("http://127.0.0.1:9/json/", Duration::from_secs(2)).unwrap();
        assert!(lookup_with_timeout(&geo, Duration::from_secs(5)).await.is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body: GeoApiResponse =
            serde_json::from_str(r#"{"ip":"1.2.3.4","country_name":"Peru","city":"Lima"}"#)
                .unwrap();
        assert_eq!(body.country_name.as_deref(), Some("Peru"));
        assert!(!body.error);

        let body: GeoApiResponse =
            serde_json::from_str(r#"{"error":true,"reason":"RateLimited"}"#).unwrap();
        assert!(body.error);
    }
}
