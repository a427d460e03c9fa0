//! Catalog Custom Resource Definition.
//!
//! A Catalog is a named source of charts. It has one primary storage
//! location and an ordered list of mirror repositories. The operator only
//! reads Catalogs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::app::ConfigSpec;

/// Catalog is a custom resource describing where charts are published.
///
/// Example:
/// ```yaml
/// apiVersion: appoperator.smoketurner.com/v1alpha1
/// kind: Catalog
/// metadata:
///   name: default
///   namespace: default
/// spec:
///   title: Default catalog
///   visibility: external
///   storage:
///     type: helm
///     url: https://charts.example.com/default/
///   repositories:
///     - type: helm
///       url: https://charts.example.com/default/
///     - type: oci
///       url: oci://registry.example.com/charts/default/
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appoperator.smoketurner.com",
    version = "v1alpha1",
    kind = "Catalog",
    plural = "catalogs",
    shortname = "cat",
    namespaced,
    printcolumn = r#"{"name":"Visibility", "type":"string", "jsonPath":".spec.visibility"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.storage.url"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSpec {
    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Whether the catalog is internal to the platform (default: external).
    #[serde(default)]
    pub visibility: Visibility,

    /// Primary storage location.
    pub storage: Repository,

    /// Mirror repositories in preference order. May be empty.
    #[serde(default)]
    pub repositories: Vec<Repository>,

    /// Catalog-level configuration layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSpec>,
}

/// Catalog visibility.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    /// Platform-internal catalog. Charts resolve by URL construction.
    Internal,
    /// Public catalog. Charts are verified against the repository index.
    #[default]
    External,
}

/// Repository protocol.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RepositoryType {
    /// Classic Helm HTTP repository with an `index.yaml`.
    #[default]
    Helm,
    /// OCI registry.
    Oci,
}

impl RepositoryType {
    /// Lowercase name used in object names and HelmRepository specs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Helm => "helm",
            RepositoryType::Oci => "oci",
        }
    }
}

impl std::fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository location.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Protocol of the repository.
    #[serde(default, rename = "type")]
    pub repo_type: RepositoryType,
    /// Base URL of the repository.
    pub url: String,
}

impl Repository {
    /// Create a repository location.
    pub fn new(repo_type: RepositoryType, url: impl Into<String>) -> Self {
        Self {
            repo_type,
            url: url.into(),
        }
    }

    /// URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl Catalog {
    /// Every location of this catalog: storage first, then mirrors, without
    /// duplicates.
    pub fn locations(&self) -> Vec<Repository> {
        let mut all = vec![self.spec.storage.clone()];
        for repo in &self.spec.repositories {
            if !all.contains(repo) {
                all.push(repo.clone());
            }
        }
        all
    }

    /// Whether charts in this catalog resolve without an index lookup.
    pub fn is_internal(&self) -> bool {
        self.spec.visibility == Visibility::Internal
    }
}
