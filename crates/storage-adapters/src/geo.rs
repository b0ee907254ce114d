//! Geo-ip lookups.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{GeoLocator, Location, Result};

/// Used when no lookup endpoint is configured: every address is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGeoLocator;

#[async_trait]
impl GeoLocator for NoopGeoLocator {
    async fn locate(&self, _ip_address: &str) -> Result<Location> {
        Ok(Location::default())
    }
}

/// Answers keyed by address, bounded in size and age.
///
/// A full cache first drops expired entries; when every entry is still
/// fresh the new answer is not cached.
#[derive(Debug)]
pub struct LocationCache {
    entries: DashMap<String, (Location, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl LocationCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, ip: &str, now: Instant) -> Option<Location> {
        let hit = self.entries.get(ip)?;
        let (location, stored) = hit.value();
        if now.duration_since(*stored) < self.ttl {
            return Some(location.clone());
        }
        drop(hit);
        self.entries.remove(ip);
        None
    }

    pub fn insert(&self, ip: &str, location: Location, now: Instant) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(ip) {
            self.entries
                .retain(|_, (_, stored)| now.duration_since(*stored) < self.ttl);
            if self.entries.len() >= self.capacity {
                return;
            }
        }
        self.entries.insert(ip.to_string(), (location, now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(feature = "geo-http")]
pub use http::HttpGeoLocator;

#[cfg(feature = "geo-http")]
mod http {
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use domains::{AppError, GeoLocator, Location, Result};
    use serde::Deserialize;
    use thiserror::Error;
    use tracing::debug;

    use super::LocationCache;

    const CACHE_CAPACITY: usize = 10_000;
    const CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

    #[derive(Debug, Error)]
    enum GeoError {
        #[error("geo request failed: {0}")]
        Http(#[from] reqwest::Error),
        #[error("geo lookup rejected {ip}: {message}")]
        Rejected { ip: String, message: String },
    }

    impl From<GeoError> for AppError {
        fn from(err: GeoError) -> Self {
            AppError::Upstream(err.to_string())
        }
    }

    /// ip-api style response body.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Lookup {
        status: String,
        message: Option<String>,
        city: Option<String>,
        country: Option<String>,
        country_code: Option<String>,
    }

    /// `GET {endpoint}/{ip}` with a bounded per-process cache of answers.
    pub struct HttpGeoLocator {
        client: reqwest::Client,
        endpoint: String,
        cache: LocationCache,
    }

    impl HttpGeoLocator {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(GeoError::from)?;
            Ok(Self {
                client,
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
                cache: LocationCache::new(CACHE_CAPACITY, CACHE_TTL),
            })
        }

        async fn fetch(&self, ip: &str) -> std::result::Result<Location, GeoError> {
            let lookup: Lookup = self
                .client
                .get(format!("{}/{}", self.endpoint, ip))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if lookup.status != "success" {
                return Err(GeoError::Rejected {
                    ip: ip.to_string(),
                    message: lookup.message.unwrap_or_else(|| lookup.status.clone()),
                });
            }

            Ok(Location {
                city: lookup.city,
                country: lookup.country,
                country_code: lookup.country_code,
            })
        }
    }

    #[async_trait]
    impl GeoLocator for HttpGeoLocator {
        async fn locate(&self, ip_address: &str) -> Result<Location> {
            if let Some(hit) = self.cache.get(ip_address, Instant::now()) {
                debug!(ip = ip_address, "geo cache hit");
                return Ok(hit);
            }
            let location = self.fetch(ip_address).await?;
            self.cache.insert(ip_address, location.clone(), Instant::now());
            Ok(location)
        }
    }
}
