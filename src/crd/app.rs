//! App Custom Resource Definition.
//!
//! An App declares "install this chart, at this version, from this catalog"
//! into a target namespace of the local cluster or of a remote cluster
//! reached through a kubeconfig Secret.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// App is a custom resource for installing a catalog app.
///
/// Example:
/// ```yaml
/// apiVersion: appoperator.smoketurner.com/v1alpha1
/// kind: App
/// metadata:
///   name: ingress-nginx
///   namespace: org-acme
/// spec:
///   name: ingress-nginx
///   version: 4.10.0
///   catalog: default
///   namespace: kube-system
///   kubeConfig:
///     inCluster: false
///     secret:
///       name: acme-kubeconfig
///       namespace: org-acme
///   userConfig:
///     configMap:
///       name: ingress-nginx-user-values
///       namespace: org-acme
///   dependsOn:
///     - cert-manager
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appoperator.smoketurner.com",
    version = "v1alpha1",
    kind = "App",
    plural = "apps",
    shortname = "ap",
    status = "AppStatus",
    namespaced,
    printcolumn = r#"{"name":"Chart", "type":"string", "jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Desired", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Installed", "type":"string", "jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.release.status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Chart name inside the catalog.
    pub name: String,

    /// Chart version to install.
    pub version: String,

    /// Name of the Catalog providing the chart.
    pub catalog: String,

    /// Namespace of the Catalog (default: default).
    #[serde(default = "default_catalog_namespace")]
    pub catalog_namespace: String,

    /// Namespace the release is installed into on the target cluster.
    pub namespace: String,

    /// Target cluster credentials.
    #[serde(default)]
    pub kube_config: KubeConfigSpec,

    /// Request-level configuration layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSpec>,

    /// User-level configuration layer, applied last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_config: Option<ConfigSpec>,

    /// Additional configuration sources, applied in ascending priority.
    #[serde(default)]
    pub extra_configs: Vec<ExtraConfig>,

    /// Install policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<TimeoutPolicy>,

    /// Upgrade policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<TimeoutPolicy>,

    /// Rollback policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<TimeoutPolicy>,

    /// Uninstall policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<TimeoutPolicy>,

    /// Names of Apps in the same namespace that must be deployed at their
    /// desired version before this App is released.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Time-boxed suppression of reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cordon: Option<CordonSpec>,
}

fn default_catalog_namespace() -> String {
    "default".to_string()
}

/// Target cluster credentials.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfigSpec {
    /// Install into the cluster the operator runs in (default: true).
    #[serde(default = "default_in_cluster")]
    pub in_cluster: bool,

    /// Secret holding a kubeconfig under the `kubeConfig` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<NamespacedRef>,

    /// Kubeconfig context to use (default: current context).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Default for KubeConfigSpec {
    fn default() -> Self {
        Self {
            in_cluster: default_in_cluster(),
            secret: None,
            context: None,
        }
    }
}

fn default_in_cluster() -> bool {
    true
}

impl KubeConfigSpec {
    /// Key identifying these credentials in the client cache.
    pub fn cache_key(&self) -> String {
        match (&self.secret, self.in_cluster) {
            (Some(secret), false) => format!(
                "{}/{}#{}",
                secret.namespace,
                secret.name,
                self.context.as_deref().unwrap_or_default()
            ),
            _ => IN_CLUSTER_KEY.to_string(),
        }
    }

    /// Whether the release targets a remote cluster.
    pub fn is_remote(&self) -> bool {
        !self.in_cluster && self.secret.is_some()
    }
}

/// Cache key used for the local cluster.
pub const IN_CLUSTER_KEY: &str = "in-cluster";

/// Reference to a namespaced object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedRef {
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
}

/// A configuration layer made of an optional ConfigMap and an optional Secret.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    /// ConfigMap holding plain values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<NamespacedRef>,

    /// Secret holding sensitive values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<NamespacedRef>,
}

/// Kind of a configuration source.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ConfigKind {
    /// A ConfigMap.
    #[default]
    ConfigMap,
    /// A Secret.
    Secret,
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigKind::ConfigMap => write!(f, "ConfigMap"),
            ConfigKind::Secret => write!(f, "Secret"),
        }
    }
}

/// Extra configuration source with an explicit kind.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtraConfig {
    /// Kind of the source (default: configMap).
    #[serde(default)]
    pub kind: ConfigKind,
    /// Source name.
    pub name: String,
    /// Source namespace.
    pub namespace: String,
    /// Ordering among extra configs, lowest first (default: 0).
    #[serde(default)]
    pub priority: i32,
}

/// Release policy carrying an optional timeout such as `10m`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPolicy {
    /// Helm operation timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Cordon settings. While `until` lies in the future the App is skipped.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CordonSpec {
    /// RFC 3339 timestamp when the cordon lapses.
    pub until: String,
    /// Why the App is cordoned.
    #[serde(default)]
    pub reason: String,
}

/// Status of an App.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// App version of the installed chart.
    #[serde(default)]
    pub app_version: String,

    /// Installed chart version.
    #[serde(default)]
    pub version: String,

    /// Release information.
    #[serde(default)]
    pub release: ReleaseInfo,
}

impl AppStatus {
    /// Current release state, if known.
    pub fn state(&self) -> Option<ReleaseState> {
        self.release.status
    }
}

/// Release information reported for an App.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Normalized release state. Absent while nothing has been reported.
    #[serde(default)]
    pub status: Option<ReleaseState>,

    /// Free-text reason for the state.
    #[serde(default)]
    pub reason: String,

    /// When the deciding condition last transitioned.
    #[serde(default)]
    pub last_deployed: Option<String>,
}

/// Normalized release state vocabulary.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseState {
    /// Release installed or upgraded successfully.
    Deployed,
    /// Release removed from the target cluster.
    Uninstalled,
    /// Release engine is still working.
    Pending,
    /// Release failed for a reason with no more specific state.
    Failed,
    /// Release engine reported a state we cannot interpret.
    Unknown,
    /// Chart tarball could not be fetched or stored.
    PackagePullFailed,
    /// Values do not satisfy the chart's values schema.
    SchemaViolation,
    /// Rendered manifests could not be built.
    InvalidManifest,
    /// A rendered resource already exists outside the release.
    AlreadyExists,
    /// Release or resource name is invalid.
    InvalidName,
    /// Kubernetes rejected the rendered manifests, or the App spec is invalid.
    ValidationFailed,
    /// Referenced Catalog does not exist.
    CatalogNotFound,
    /// Catalog repository index could not be fetched.
    IndexUnreachable,
    /// Catalog repository index has no entries.
    IndexEmpty,
    /// Chart is not listed in the catalog index.
    PackageNotFound,
    /// Chart version is not listed in the catalog index.
    VersionNotFound,
    /// A referenced config source does not exist.
    ConfigNotFound,
    /// A referenced config source could not be parsed.
    ConfigParseError,
}

impl ReleaseState {
    /// Kebab-case name as stored in the status subresource.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Deployed => "deployed",
            ReleaseState::Uninstalled => "uninstalled",
            ReleaseState::Pending => "pending",
            ReleaseState::Failed => "failed",
            ReleaseState::Unknown => "unknown",
            ReleaseState::PackagePullFailed => "package-pull-failed",
            ReleaseState::SchemaViolation => "schema-violation",
            ReleaseState::InvalidManifest => "invalid-manifest",
            ReleaseState::AlreadyExists => "already-exists",
            ReleaseState::InvalidName => "invalid-name",
            ReleaseState::ValidationFailed => "validation-failed",
            ReleaseState::CatalogNotFound => "catalog-not-found",
            ReleaseState::IndexUnreachable => "index-unreachable",
            ReleaseState::IndexEmpty => "index-empty",
            ReleaseState::PackageNotFound => "package-not-found",
            ReleaseState::VersionNotFound => "version-not-found",
            ReleaseState::ConfigNotFound => "config-not-found",
            ReleaseState::ConfigParseError => "config-parse-error",
        }
    }

    /// Whether the state reports a problem to the App owner.
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            ReleaseState::Deployed | ReleaseState::Uninstalled | ReleaseState::Pending
        )
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort extra configs by ascending priority, keeping declared order on ties.
pub fn ordered_extra_configs(extra: &[ExtraConfig]) -> Vec<&ExtraConfig> {
    let mut ordered: Vec<&ExtraConfig> = extra.iter().collect();
    ordered.sort_by_key(|c| c.priority);
    ordered
}

/// Labels on an App copied onto everything it owns.
pub fn passthrough_labels(app: &App) -> BTreeMap<String, String> {
    app.metadata.labels.clone().unwrap_or_default()
}
