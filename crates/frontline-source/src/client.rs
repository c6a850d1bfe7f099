//! HTTP client for the Foxhole War API.
//!
//! Every request carries the configured timeout. Dynamic region data is
//! fetched with `If-None-Match` once an `ETag` is known; a `304` reply
//! returns the cached snapshot without re-downloading the map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};

use frontline_core::config::SourceConfig;
use frontline_core::source::{SourceError, WarSource};
use frontline_types::{RegionId, RegionSnapshot, War};

use crate::wire;

#[derive(Debug, Clone)]
struct CachedRegion {
    etag: String,
    snapshot: RegionSnapshot,
}

/// [`WarSource`] backed by the public War API.
pub struct WarApiClient {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<HashMap<RegionId, CachedRegion>>,
}

impl WarApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SourceError::Http {
                url: config.base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// The API root requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<RegionId, CachedRegion>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a GET and return the body of a successful response.
    async fn get_body(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, &e))?;
        Ok(body.to_vec())
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout {
            url: url.to_owned(),
        }
    } else {
        SourceError::Http {
            url: url.to_owned(),
            message: err.to_string(),
        }
    }
}

fn decode_error(url: &str, err: &serde_json::Error) -> SourceError {
    SourceError::Decode {
        url: url.to_owned(),
        message: err.to_string(),
    }
}

impl WarSource for WarApiClient {
    async fn war(&self) -> Result<War, SourceError> {
        let url = self.url("worldconquest/war");
        let body = self.get_body(&url).await?;
        wire::parse_war(&body).map_err(|e| decode_error(&url, &e))
    }

    async fn regions(&self) -> Result<Vec<RegionId>, SourceError> {
        let url = self.url("worldconquest/maps");
        let body = self.get_body(&url).await?;
        let regions = wire::parse_regions(&body).map_err(|e| decode_error(&url, &e))?;
        tracing::debug!(count = regions.len(), "Fetched region list");
        Ok(regions)
    }

    async fn region_snapshot(
        &self,
        region: &RegionId,
    ) -> Result<Option<RegionSnapshot>, SourceError> {
        let url = self.url(&format!("worldconquest/maps/{region}/dynamic/public"));
        let cached_etag = self.cache().get(region).map(|c| c.etag.clone());

        let mut request = self.client.get(&url);
        if let Some(etag) = &cached_etag {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                let cached = self.cache().get(region).map(|c| c.snapshot.clone());
                tracing::trace!(%region, hit = cached.is_some(), "Region not modified");
                return cached.map(Some).ok_or(SourceError::Status {
                    url,
                    status: StatusCode::NOT_MODIFIED.as_u16(),
                });
            }
            StatusCode::NOT_FOUND => {
                self.cache().remove(region);
                tracing::debug!(%region, "Region has no dynamic data");
                return Ok(None);
            }
            status if !status.is_success() => {
                return Err(SourceError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url, &e))?;
        let snapshot = wire::parse_region(region, &body).map_err(|e| decode_error(&url, &e))?;

        if let Some(etag) = etag {
            self.cache().insert(
                region.clone(),
                CachedRegion {
                    etag,
                    snapshot: snapshot.clone(),
                },
            );
        }
        Ok(Some(snapshot))
    }
}
