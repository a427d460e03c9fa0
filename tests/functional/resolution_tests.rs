//! Chart resolution against fake repository indexes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use app_operator::cache::{ChartIndex, IndexCache, IndexError, IndexFetcher};
use app_operator::crd::flux::CONDITION_READY;
use app_operator::crd::{ReleaseState, Repository, RepositoryType};
use app_operator::resolver::{ResolutionError, pick_repository, resolve_chart};

use crate::fixtures::{CatalogBuilder, condition, release_on};

const PRIMARY: &str = "https://primary.example.com/charts";
const MIRROR: &str = "https://mirror.example.com/charts";

const INDEX: &str = r#"
apiVersion: v1
entries:
  hello:
    - version: 1.0.0
      appVersion: "1.0"
      urls: [hello-1.0.0.tgz]
    - version: 0.9.0
      urls: [https://cdn.example.com/hello-0.9.0.tgz]
"#;

/// Serves canned indexes and records every fetched URL.
#[derive(Default)]
struct FakeFetcher {
    indexes: HashMap<String, Result<ChartIndex, IndexError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn serving(mut self, url: &str, yaml: &str) -> Self {
        self.indexes
            .insert(url.to_string(), Ok(ChartIndex::from_yaml(yaml).unwrap()));
        self
    }

    fn down(mut self, url: &str) -> Self {
        self.indexes.insert(
            url.to_string(),
            Err(IndexError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        );
        self
    }

    fn empty(mut self, url: &str) -> Self {
        self.indexes
            .insert(url.to_string(), Err(IndexError::Empty { url: url.to_string() }));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<ChartIndex, IndexError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.indexes.get(url).cloned().unwrap_or_else(|| {
            Err(IndexError::Unreachable {
                url: url.to_string(),
                reason: "no such host".to_string(),
            })
        })
    }
}

fn cache(fetcher: FakeFetcher) -> (Arc<FakeFetcher>, IndexCache) {
    let fetcher = Arc::new(fetcher);
    let cache = IndexCache::new(fetcher.clone(), Duration::from_secs(300));
    (fetcher, cache)
}

#[tokio::test]
async fn test_resolves_relative_chart_url() {
    let (_, indexes) = cache(FakeFetcher::default().serving(PRIMARY, INDEX));
    let catalog = CatalogBuilder::new("default", PRIMARY).build();
    let picked = pick_repository(&catalog, None);

    let chart = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap();
    assert_eq!(chart.url, format!("{}/hello-1.0.0.tgz", PRIMARY));
    assert_eq!(chart.app_version.as_deref(), Some("1.0"));
    assert!(chart.source_name.starts_with("default-helm-"));

    let chart = resolve_chart(&indexes, &catalog, &picked, "hello", "v0.9.0")
        .await
        .unwrap();
    assert_eq!(chart.url, "https://cdn.example.com/hello-0.9.0.tgz");
}

#[tokio::test]
async fn test_missing_chart_and_version() {
    let (_, indexes) = cache(FakeFetcher::default().serving(PRIMARY, INDEX));
    let catalog = CatalogBuilder::new("default", PRIMARY).build();
    let picked = pick_repository(&catalog, None);

    let err = resolve_chart(&indexes, &catalog, &picked, "hello", "2.0.0")
        .await
        .unwrap_err();
    assert_eq!(err.state(), ReleaseState::VersionNotFound);

    let err = resolve_chart(&indexes, &catalog, &picked, "goodbye", "1.0.0")
        .await
        .unwrap_err();
    assert_eq!(err.state(), ReleaseState::PackageNotFound);
}

#[tokio::test]
async fn test_unreachable_mirror_falls_through_to_next_location() {
    let (fetcher, indexes) = cache(FakeFetcher::default().down(MIRROR).serving(PRIMARY, INDEX));
    let catalog = CatalogBuilder::new("default", PRIMARY).mirror(MIRROR).build();
    let picked = pick_repository(&catalog, None);
    assert_eq!(picked.url, MIRROR);

    let chart = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap();
    assert_eq!(chart.repository.url, PRIMARY);
    assert_eq!(fetcher.calls(), vec![MIRROR.to_string(), PRIMARY.to_string()]);
}

#[tokio::test]
async fn test_first_error_is_reported() {
    let (_, indexes) = cache(FakeFetcher::default().down(PRIMARY).down(MIRROR));
    let catalog = CatalogBuilder::new("default", PRIMARY).mirror(MIRROR).build();
    let picked = pick_repository(&catalog, None);

    let err = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::IndexUnreachable { ref url, .. } if url == MIRROR));
    assert_eq!(err.state(), ReleaseState::IndexUnreachable);
}

#[tokio::test]
async fn test_empty_index() {
    let (_, indexes) = cache(FakeFetcher::default().empty(PRIMARY));
    let catalog = CatalogBuilder::new("default", PRIMARY).build();
    let picked = pick_repository(&catalog, None);

    let err = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap_err();
    assert_eq!(err.state(), ReleaseState::IndexEmpty);
}

#[tokio::test]
async fn test_index_is_fetched_once_per_ttl() {
    let (fetcher, indexes) = cache(FakeFetcher::default().serving(PRIMARY, INDEX));
    let catalog = CatalogBuilder::new("default", PRIMARY).build();
    let picked = pick_repository(&catalog, None);

    for version in ["1.0.0", "0.9.0", "1.0.0"] {
        resolve_chart(&indexes, &catalog, &picked, "hello", version)
            .await
            .unwrap();
    }
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_internal_catalog_skips_index() {
    let (fetcher, indexes) = cache(FakeFetcher::default());
    let catalog = CatalogBuilder::new("control-plane", PRIMARY).internal().build();
    let picked = pick_repository(&catalog, None);

    let chart = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap();
    assert_eq!(chart.url, format!("{}/hello-1.0.0.tgz", PRIMARY));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_oci_mirror_is_not_index_checked() {
    let (fetcher, indexes) = cache(FakeFetcher::default());
    let catalog = CatalogBuilder::new("default", PRIMARY)
        .oci_mirror("oci://registry.example.com/charts")
        .build();
    let picked = pick_repository(&catalog, None);
    assert_eq!(picked.repo_type, RepositoryType::Oci);

    let chart = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap();
    assert_eq!(chart.url, "oci://registry.example.com/charts/hello:1.0.0");
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_failover_after_artifact_failure() {
    let (_, indexes) = cache(FakeFetcher::default().serving(PRIMARY, INDEX).serving(MIRROR, INDEX));
    let catalog = CatalogBuilder::new("default", PRIMARY)
        .mirror(PRIMARY)
        .mirror(MIRROR)
        .build();
    let primary = Repository::new(RepositoryType::Helm, PRIMARY);
    let failing = release_on(&primary, vec![condition(CONDITION_READY, "False", "ArtifactFailed", "")]);

    let picked = pick_repository(&catalog, Some(&failing));
    assert_eq!(picked.url, MIRROR);
    let chart = resolve_chart(&indexes, &catalog, &picked, "hello", "1.0.0")
        .await
        .unwrap();
    assert_eq!(chart.repository.url, MIRROR);
}
