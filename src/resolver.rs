//! Repository selection and chart resolution.
//!
//! A Catalog can be served from several mirrors. Once a release is bound to
//! a mirror it stays there until Flux reports that the chart artifact could
//! not be fetched, then the next mirror is tried on the following tick.

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{IndexCache, IndexError};
use crate::controller::common::short_hash;
use crate::crd::flux::{HelmRelease, REASON_ARTIFACT_FAILED, latest_condition};
use crate::crd::{Catalog, ReleaseState, Repository, RepositoryType};

/// Why a chart could not be resolved in a repository.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The repository index could not be fetched.
    #[error("index of {url} unreachable: {reason}")]
    IndexUnreachable { url: String, reason: String },

    /// The repository index lists no charts.
    #[error("index of {url} is empty")]
    IndexEmpty { url: String },

    /// The chart is not in the index.
    #[error("chart {chart} not found in {url}")]
    PackageNotFound { url: String, chart: String },

    /// The chart exists but not at the requested version.
    #[error("chart {chart} has no version {version} in {url}")]
    VersionNotFound {
        url: String,
        chart: String,
        version: String,
    },
}

impl ResolutionError {
    /// Release state reported for this failure.
    pub fn state(&self) -> ReleaseState {
        match self {
            ResolutionError::IndexUnreachable { .. } => ReleaseState::IndexUnreachable,
            ResolutionError::IndexEmpty { .. } => ReleaseState::IndexEmpty,
            ResolutionError::PackageNotFound { .. } => ReleaseState::PackageNotFound,
            ResolutionError::VersionNotFound { .. } => ReleaseState::VersionNotFound,
        }
    }

    fn from_index(err: IndexError) -> Self {
        match err {
            IndexError::Unreachable { url, reason } => ResolutionError::IndexUnreachable { url, reason },
            IndexError::Empty { url } => ResolutionError::IndexEmpty { url },
        }
    }
}

/// A chart verified to exist in a repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChart {
    /// Repository serving the chart.
    pub repository: Repository,
    /// Name of the HelmRepository source for `repository`.
    pub source_name: String,
    /// Chart name.
    pub chart: String,
    /// Chart version as requested.
    pub version: String,
    /// App version from the index, when known.
    pub app_version: Option<String>,
    /// Download location of the chart.
    pub url: String,
}

/// Name of the HelmRepository serving `repo` for `catalog`.
///
/// Deterministic so every App of a catalog shares the same sources.
pub fn helm_repository_name(catalog: &str, repo: &Repository) -> String {
    format!(
        "{}-{}-{}",
        catalog,
        repo.repo_type.as_str(),
        short_hash(&[repo.base_url()])
    )
}

/// Choose the repository a release should be served from.
///
/// Without mirrors the storage location is used. With mirrors the choice is
/// sticky: the mirror the current HelmRelease points at is kept unless its
/// most recent condition reports an artifact failure, in which case the next
/// mirror (wrapping around) is returned.
pub fn pick_repository(catalog: &Catalog, current: Option<&HelmRelease>) -> Repository {
    let mirrors = &catalog.spec.repositories;
    let (first, rest) = match mirrors.split_first() {
        None => return catalog.spec.storage.clone(),
        Some(split) => split,
    };
    if rest.is_empty() {
        return first.clone();
    }

    let Some(release) = current else {
        return first.clone();
    };

    let catalog_name = catalog.metadata.name.as_deref().unwrap_or_default();
    let source = &release.spec.chart.spec.source_ref.name;
    let Some(index) = mirrors
        .iter()
        .position(|repo| &helm_repository_name(catalog_name, repo) == source)
    else {
        debug!(source = %source, "Current source not in catalog, using first repository");
        return first.clone();
    };

    let failed = latest_condition(release.conditions())
        .is_some_and(|c| c.reason == REASON_ARTIFACT_FAILED);
    let chosen = if failed { (index + 1) % mirrors.len() } else { index };
    if failed {
        warn!(
            from = %source,
            to_index = chosen,
            "Chart artifact failed, failing over to next repository"
        );
    }
    mirrors.get(chosen).unwrap_or(first).clone()
}

/// Verify that `chart` at `version` is available, starting with `picked` and
/// falling back to the catalog's other locations in declared order.
///
/// When no location serves the chart the error for `picked` is returned.
pub async fn resolve_chart(
    indexes: &IndexCache,
    catalog: &Catalog,
    picked: &Repository,
    chart: &str,
    version: &str,
) -> Result<ResolvedChart, ResolutionError> {
    let mut candidates = vec![picked.clone()];
    candidates.extend(catalog.locations().into_iter().filter(|r| r != picked));

    let mut first_error = None;
    for repo in candidates {
        match resolve_in(indexes, catalog, &repo, chart, version).await {
            Ok(resolved) => return Ok(resolved),
            Err(e) => {
                debug!(url = %repo.url, error = %e, "Chart not resolvable in repository");
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.unwrap_or_else(|| ResolutionError::PackageNotFound {
        url: picked.url.clone(),
        chart: chart.to_string(),
    }))
}

async fn resolve_in(
    indexes: &IndexCache,
    catalog: &Catalog,
    repo: &Repository,
    chart: &str,
    version: &str,
) -> Result<ResolvedChart, ResolutionError> {
    let catalog_name = catalog.metadata.name.as_deref().unwrap_or_default();
    let resolved = |url: String, app_version: Option<String>| ResolvedChart {
        repository: repo.clone(),
        source_name: helm_repository_name(catalog_name, repo),
        chart: chart.to_string(),
        version: version.to_string(),
        app_version,
        url,
    };

    if repo.repo_type == RepositoryType::Oci || catalog.is_internal() {
        return Ok(resolved(constructed_url(repo, chart, version), None));
    }

    let index = indexes
        .get(&repo.url)
        .await
        .map_err(ResolutionError::from_index)?;
    if index.versions(chart).is_none_or(|v| v.is_empty()) {
        return Err(ResolutionError::PackageNotFound {
            url: repo.url.clone(),
            chart: chart.to_string(),
        });
    }
    let found = index
        .find(chart, version)
        .ok_or_else(|| ResolutionError::VersionNotFound {
            url: repo.url.clone(),
            chart: chart.to_string(),
            version: version.to_string(),
        })?;

    let url = found
        .urls
        .first()
        .map(|u| absolute_url(repo, u))
        .unwrap_or_else(|| constructed_url(repo, chart, version));
    Ok(resolved(url, found.app_version.clone()))
}

/// Predictable chart location for repositories that are not index-checked.
fn constructed_url(repo: &Repository, chart: &str, version: &str) -> String {
    match repo.repo_type {
        RepositoryType::Oci => format!("{}/{}:{}", repo.base_url(), chart, version),
        RepositoryType::Helm => format!("{}/{}-{}.tgz", repo.base_url(), chart, version),
    }
}

fn absolute_url(repo: &Repository, url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("{}/{}", repo.base_url(), url.trim_start_matches('/'))
    }
}
