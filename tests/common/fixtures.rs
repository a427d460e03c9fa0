//! Test fixtures and builders for Apps, Catalogs and HelmReleases.
//!
//! Provides builder patterns for creating test resources with sensible
//! defaults.

#![allow(dead_code)]

use std::collections::BTreeMap;

use kube::api::ObjectMeta;

use app_operator::controller::descriptor::DescriptorInputs;
use app_operator::crd::flux::{FluxCondition, HelmRelease, HelmReleaseSpec, HelmReleaseStatus, Snapshot};
use app_operator::crd::{
    App, AppSpec, AppStatus, Catalog, CatalogSpec, ConfigKind, ConfigSpec, CordonSpec, ExtraConfig,
    KubeConfigSpec, NamespacedRef, ReleaseInfo, ReleaseState, Repository, RepositoryType, Visibility,
};
use app_operator::resolver::{ResolvedChart, helm_repository_name};

/// Namespace Apps live in unless a test says otherwise.
pub const APP_NAMESPACE: &str = "org-acme";

/// Builder for App test resources.
#[derive(Clone, Debug)]
pub struct AppBuilder {
    name: String,
    namespace: String,
    spec: AppSpec,
    labels: BTreeMap<String, String>,
    generation: Option<i64>,
    uid: Option<String>,
    status: Option<AppStatus>,
}

impl AppBuilder {
    /// Create a new builder installing chart `name` at version 1.0.0.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            spec: AppSpec {
                name: name.clone(),
                version: "1.0.0".to_string(),
                catalog: "default".to_string(),
                catalog_namespace: "default".to_string(),
                namespace: "apps".to_string(),
                ..Default::default()
            },
            name,
            namespace: APP_NAMESPACE.to_string(),
            labels: BTreeMap::new(),
            generation: Some(1),
            uid: None,
            status: None,
        }
    }

    /// Set the namespace of the App object.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the chart name.
    pub fn chart(mut self, chart: impl Into<String>) -> Self {
        self.spec.name = chart.into();
        self
    }

    /// Set the desired chart version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.spec.version = version.into();
        self
    }

    /// Set the catalog name.
    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.spec.catalog = catalog.into();
        self
    }

    /// Set the target namespace.
    pub fn target_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.spec.namespace = namespace.into();
        self
    }

    /// Declare a dependency on another App of the namespace.
    pub fn depends_on(mut self, app: impl Into<String>) -> Self {
        self.spec.depends_on.push(app.into());
        self
    }

    /// Target a remote cluster through a kubeconfig Secret in the App
    /// namespace.
    pub fn remote(mut self, secret: impl Into<String>) -> Self {
        self.spec.kube_config = KubeConfigSpec {
            in_cluster: false,
            secret: Some(NamespacedRef {
                name: secret.into(),
                namespace: self.namespace.clone(),
            }),
            context: None,
        };
        self
    }

    /// Cordon the App until `until`.
    pub fn cordon(mut self, until: impl Into<String>, reason: impl Into<String>) -> Self {
        self.spec.cordon = Some(CordonSpec {
            until: until.into(),
            reason: reason.into(),
        });
        self
    }

    /// Reference an App-level ConfigMap.
    pub fn config_map(mut self, name: impl Into<String>) -> Self {
        let spec = self.spec.config.get_or_insert_with(ConfigSpec::default);
        spec.config_map = Some(NamespacedRef {
            name: name.into(),
            namespace: self.namespace.clone(),
        });
        self
    }

    /// Reference a user Secret.
    pub fn user_secret(mut self, name: impl Into<String>) -> Self {
        let spec = self.spec.user_config.get_or_insert_with(ConfigSpec::default);
        spec.secret = Some(NamespacedRef {
            name: name.into(),
            namespace: self.namespace.clone(),
        });
        self
    }

    /// Add an extra ConfigMap layer.
    pub fn extra_config(mut self, name: impl Into<String>, priority: i32) -> Self {
        self.spec.extra_configs.push(ExtraConfig {
            kind: ConfigKind::ConfigMap,
            name: name.into(),
            namespace: self.namespace.clone(),
            priority,
        });
        self
    }

    /// Add a label to the App.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the generation.
    pub fn generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Set the UID (for testing owner references).
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Report the App as deployed at `version`.
    pub fn deployed(mut self, version: impl Into<String>) -> Self {
        self.status = Some(AppStatus {
            app_version: String::new(),
            version: version.into(),
            release: ReleaseInfo {
                status: Some(ReleaseState::Deployed),
                reason: "Helm install succeeded".to_string(),
                last_deployed: Some("2024-03-01T12:00:00Z".to_string()),
            },
        });
        self
    }

    /// Report the App in `state` without an installed version.
    pub fn state(mut self, state: ReleaseState) -> Self {
        self.status = Some(AppStatus {
            release: ReleaseInfo {
                status: Some(state),
                ..Default::default()
            },
            ..Default::default()
        });
        self
    }

    /// Build the App.
    pub fn build(self) -> App {
        App {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace),
                labels: if self.labels.is_empty() {
                    None
                } else {
                    Some(self.labels)
                },
                generation: self.generation,
                uid: Some(self.uid.unwrap_or_else(|| format!("test-uid-{}", self.name))),
                ..Default::default()
            },
            spec: self.spec,
            status: self.status,
        }
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new("hello")
    }
}

/// Builder for Catalog test resources.
#[derive(Clone, Debug)]
pub struct CatalogBuilder {
    name: String,
    namespace: String,
    spec: CatalogSpec,
}

impl CatalogBuilder {
    /// Create a catalog whose storage is the Helm repository at `storage`.
    pub fn new(name: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            spec: CatalogSpec {
                storage: Repository::new(RepositoryType::Helm, storage),
                ..Default::default()
            },
        }
    }

    /// Add a Helm mirror.
    pub fn mirror(mut self, url: impl Into<String>) -> Self {
        self.spec
            .repositories
            .push(Repository::new(RepositoryType::Helm, url));
        self
    }

    /// Add an OCI mirror.
    pub fn oci_mirror(mut self, url: impl Into<String>) -> Self {
        self.spec
            .repositories
            .push(Repository::new(RepositoryType::Oci, url));
        self
    }

    /// Mark the catalog internal.
    pub fn internal(mut self) -> Self {
        self.spec.visibility = Visibility::Internal;
        self
    }

    /// Reference a catalog-level ConfigMap.
    pub fn config_map(mut self, name: impl Into<String>) -> Self {
        let spec = self.spec.config.get_or_insert_with(ConfigSpec::default);
        spec.config_map = Some(NamespacedRef {
            name: name.into(),
            namespace: self.namespace.clone(),
        });
        self
    }

    /// Build the Catalog.
    pub fn build(self) -> Catalog {
        let mut catalog = Catalog::new(&self.name, self.spec);
        catalog.metadata.namespace = Some(self.namespace);
        catalog
    }
}

/// A Flux condition with a fixed transition time.
pub fn condition(type_: &str, status: &str, reason: &str, message: &str) -> FluxCondition {
    FluxCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Some("2024-03-01T12:00:00Z".to_string()),
    }
}

/// A HelmRelease sourcing its chart from `repo` of catalog `default`.
pub fn release_on(repo: &Repository, conditions: Vec<FluxCondition>) -> HelmRelease {
    let mut spec = HelmReleaseSpec::default();
    spec.chart.spec.source_ref.name = helm_repository_name("default", repo);
    let mut release = HelmRelease::new("hello", spec);
    release.status = Some(HelmReleaseStatus {
        conditions,
        history: vec![Snapshot {
            chart_version: "1.0.0".to_string(),
            app_version: "1.0".to_string(),
            status: "deployed".to_string(),
        }],
        ..Default::default()
    });
    release
}

/// The chart `app` asks for, resolved in the storage of `catalog`.
pub fn resolved_chart(app: &App, catalog: &Catalog) -> ResolvedChart {
    let repo = catalog.spec.storage.clone();
    ResolvedChart {
        source_name: helm_repository_name(catalog.metadata.name.as_deref().unwrap_or_default(), &repo),
        url: format!("{}/{}-{}.tgz", repo.base_url(), app.spec.name, app.spec.version),
        repository: repo,
        chart: app.spec.name.clone(),
        version: app.spec.version.clone(),
        app_version: None,
    }
}

/// Descriptor inputs for a fresh, non-deleting build.
pub fn inputs<'a>(app: &'a App, chart: &'a ResolvedChart, siblings: &'a [App]) -> DescriptorInputs<'a> {
    DescriptorInputs {
        app,
        config: None,
        chart: Some(chart),
        current: None,
        siblings,
        deleting: false,
        now: "2024-06-01T00:00:00Z".parse().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_builder_defaults() {
        let app = AppBuilder::new("hello").build();
        assert_eq!(app.metadata.name.as_deref(), Some("hello"));
        assert_eq!(app.metadata.namespace.as_deref(), Some(APP_NAMESPACE));
        assert_eq!(app.spec.version, "1.0.0");
        assert!(!app.spec.kube_config.is_remote());
    }

    #[test]
    fn test_app_builder_remote() {
        let app = AppBuilder::new("hello").remote("acme-kubeconfig").build();
        assert!(app.spec.kube_config.is_remote());
        let secret = app.spec.kube_config.secret.as_ref().unwrap();
        assert_eq!(secret.namespace, APP_NAMESPACE);
    }

    #[test]
    fn test_catalog_builder() {
        let catalog = CatalogBuilder::new("default", "https://a.example.com")
            .mirror("https://b.example.com")
            .build();
        assert_eq!(catalog.locations().len(), 2);
        assert!(!catalog.is_internal());
    }
}
