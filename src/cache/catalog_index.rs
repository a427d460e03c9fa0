//! Catalog index cache.
//!
//! Helm repositories publish an `index.yaml` listing every chart and
//! version they serve. Indexes are fetched lazily and kept for a TTL.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::TtlCache;
use crate::retry::{RetryConfig, retry_if};

/// Failure to obtain a repository index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The index could not be downloaded or parsed.
    #[error("index {url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    /// The index was fetched but lists no charts.
    #[error("index {url} has no entries")]
    Empty { url: String },
}

/// Parsed repository index.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ChartIndex {
    /// Chart name to published versions.
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

/// One published chart version.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    /// Chart version.
    pub version: String,
    /// Version of the packaged application.
    #[serde(default)]
    pub app_version: Option<String>,
    /// Download URLs of the chart tarball.
    #[serde(default)]
    pub urls: Vec<String>,
}

impl ChartIndex {
    /// Parse an `index.yaml` document.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Published versions of `chart`.
    pub fn versions(&self, chart: &str) -> Option<&[ChartVersion]> {
        self.entries.get(chart).map(Vec::as_slice)
    }

    /// Find `version` of `chart`. A leading `v` is ignored on both sides.
    pub fn find(&self, chart: &str, version: &str) -> Option<&ChartVersion> {
        self.versions(chart)?
            .iter()
            .find(|v| same_version(&v.version, version))
    }
}

fn same_version(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches('v');
    let b = b.trim_start_matches('v');
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Downloads repository indexes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    /// Fetch and parse the index of the repository at `url`.
    async fn fetch(&self, url: &str) -> Result<ChartIndex, IndexError>;
}

/// Fetches `<url>/index.yaml` over HTTP.
pub struct HttpIndexFetcher {
    http: reqwest::Client,
    retry: RetryConfig,
}

impl HttpIndexFetcher {
    /// Create a fetcher with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            retry: RetryConfig::with_max_attempts(2),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<ChartIndex, IndexError> {
        let index_url = format!("{}/index.yaml", url.trim_end_matches('/'));
        let unreachable = |reason: String| IndexError::Unreachable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(&index_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| unreachable(e.to_string()))?;
        let body = response.text().await.map_err(|e| unreachable(e.to_string()))?;
        let index = ChartIndex::from_yaml(&body).map_err(|e| unreachable(format!("invalid index: {}", e)))?;

        if index.entries.is_empty() {
            return Err(IndexError::Empty {
                url: url.to_string(),
            });
        }
        Ok(index)
    }
}

#[async_trait]
impl IndexFetcher for HttpIndexFetcher {
    async fn fetch(&self, url: &str) -> Result<ChartIndex, IndexError> {
        retry_if(
            &self.retry,
            "fetch_index",
            |e| matches!(e, IndexError::Unreachable { .. }),
            || self.fetch_once(url),
        )
        .await
    }
}

/// Read-through cache of repository indexes keyed by repository URL.
pub struct IndexCache {
    cache: TtlCache<String, Arc<ChartIndex>>,
    fetcher: Arc<dyn IndexFetcher>,
}

impl IndexCache {
    /// Create a cache that fetches misses through `fetcher`.
    pub fn new(fetcher: Arc<dyn IndexFetcher>, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            fetcher,
        }
    }

    /// Index of the repository at `url`, fetched on a miss or after expiry.
    pub async fn get(&self, url: &str) -> Result<Arc<ChartIndex>, IndexError> {
        let key = url.trim_end_matches('/').to_string();
        self.cache
            .get_or_try_insert_with(&key, || async {
                debug!(url = %key, "Fetching catalog index");
                self.fetcher.fetch(&key).await.map(Arc::new)
            })
            .await
    }
}
