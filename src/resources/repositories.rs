//! HelmRepository sources for Catalog locations.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::controller::common::{FIELD_MANAGER, LABEL_CATALOG, LABEL_MANAGED_BY};
use crate::crd::flux::{HelmRepository, HelmRepositorySpec};
use crate::crd::{Repository, RepositoryType};
use crate::resolver::helm_repository_name;

/// Index refresh interval of generated sources.
pub const REPOSITORY_INTERVAL: &str = "10m";

/// Generate the HelmRepository serving `repo` for `catalog`.
///
/// Sources are shared by every App of the catalog, so they carry no owner
/// reference.
pub fn generate_helm_repository(catalog: &str, namespace: &str, repo: &Repository) -> HelmRepository {
    let mut source = HelmRepository::new(
        &helm_repository_name(catalog, repo),
        HelmRepositorySpec {
            url: repo.url.clone(),
            interval: REPOSITORY_INTERVAL.to_string(),
            repo_type: match repo.repo_type {
                RepositoryType::Oci => Some(RepositoryType::Oci.as_str().to_string()),
                RepositoryType::Helm => None,
            },
        },
    );
    source.metadata = ObjectMeta {
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
            (LABEL_CATALOG.to_string(), catalog.to_string()),
        ])),
        ..source.metadata
    };
    source
}
