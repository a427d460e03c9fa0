//! Typed views of the Flux objects the operator writes and reads.
//!
//! These are not registered by the operator. Only the fields the operator
//! sets or inspects are modelled; unknown fields are ignored on read.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// `Released` condition type: outcome of the last Helm action.
pub const CONDITION_RELEASED: &str = "Released";
/// `Ready` condition type: overall reconciliation readiness.
pub const CONDITION_READY: &str = "Ready";
/// HelmChart condition type set when the chart could not be fetched.
pub const CONDITION_FETCH_FAILED: &str = "FetchFailed";
/// HelmChart condition type set when the artifact could not be stored.
pub const CONDITION_STORAGE_FAILED: &str = "StorageOperationFailed";

/// Ready reason: the chart artifact is not available to the release.
pub const REASON_ARTIFACT_FAILED: &str = "ArtifactFailed";

/// Annotation Flux watches to trigger an out-of-band reconciliation.
pub const ANNOTATION_REQUESTED_AT: &str = "reconcile.fluxcd.io/requestedAt";

/// Uninstall propagation policy requested for every release.
pub const DELETION_PROPAGATION_BACKGROUND: &str = "background";

/// Desired state of a Flux HelmRelease.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "helm.toolkit.fluxcd.io",
    version = "v2",
    kind = "HelmRelease",
    plural = "helmreleases",
    namespaced,
    status = "HelmReleaseStatus",
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseSpec {
    /// Chart template used to create the HelmChart.
    pub chart: HelmChartTemplate,

    /// Reconcile interval of the release engine.
    pub interval: String,

    /// Helm release name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    /// Namespace the release is installed into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    /// Namespace holding the Helm release storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_namespace: Option<String>,

    /// Suspend reconciliation by the release engine.
    #[serde(default)]
    pub suspend: bool,

    /// Remote cluster credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<KubeConfigReference>,

    /// Install action configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<Install>,

    /// Upgrade action configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<Upgrade>,

    /// Rollback action configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Rollback>,

    /// Uninstall action configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<Uninstall>,

    /// Values sources merged in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_from: Vec<ValuesReference>,
}

/// Chart template embedded in a HelmRelease.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartTemplate {
    /// Template spec.
    pub spec: HelmChartTemplateSpec,
}

/// Chart reference.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartTemplateSpec {
    /// Chart name.
    pub chart: String,
    /// Chart version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Source holding the chart.
    pub source_ref: CrossNamespaceObjectReference,
}

/// Reference to a source object, possibly in another namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossNamespaceObjectReference {
    /// Source kind.
    pub kind: String,
    /// Source name.
    pub name: String,
    /// Source namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Remote cluster kubeconfig reference.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfigReference {
    /// Secret holding the kubeconfig.
    pub secret_ref: SecretKeyReference,
}

/// Key inside a Secret in the HelmRelease namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyReference {
    /// Secret name.
    pub name: String,
    /// Key holding the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Install action configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Install {
    /// Helm install timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Create the target namespace if missing.
    #[serde(default)]
    pub create_namespace: bool,
    /// Skip OpenAPI validation of rendered manifests.
    #[serde(default, rename = "disableOpenAPIValidation")]
    pub disable_openapi_validation: bool,
}

/// Upgrade action configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Upgrade {
    /// Helm upgrade timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Skip OpenAPI validation of rendered manifests.
    #[serde(default, rename = "disableOpenAPIValidation")]
    pub disable_openapi_validation: bool,
}

/// Rollback action configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rollback {
    /// Helm rollback timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Uninstall action configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Uninstall {
    /// Helm uninstall timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Deletion propagation policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_propagation: Option<String>,
}

/// Values source.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValuesReference {
    /// `ConfigMap` or `Secret`.
    pub kind: String,
    /// Object name in the HelmRelease namespace.
    pub name: String,
    /// Key holding the values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_key: Option<String>,
}

/// Observed state of a HelmRelease.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseStatus {
    /// Last observed generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Reported conditions.
    #[serde(default)]
    pub conditions: Vec<FluxCondition>,
    /// `namespace/name` of the HelmChart created for this release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_chart: Option<String>,
    /// Release snapshots, newest first.
    #[serde(default)]
    pub history: Vec<Snapshot>,
    /// Chart version of the last attempted release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempted_revision: Option<String>,
}

/// A release snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Chart version of the release.
    #[serde(default)]
    pub chart_version: String,
    /// App version of the chart.
    #[serde(default)]
    pub app_version: String,
    /// Helm release status.
    #[serde(default)]
    pub status: String,
}

/// Condition as reported by Flux controllers.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FluxCondition {
    /// Condition type.
    #[serde(default, rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`.
    #[serde(default)]
    pub status: String,
    /// Machine-readable reason.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// RFC 3339 time of the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl FluxCondition {
    /// Whether the condition status is `True`.
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    fn transition_time(&self) -> Option<jiff::Timestamp> {
        self.last_transition_time
            .as_deref()
            .and_then(|t| t.parse::<jiff::Timestamp>().ok())
    }
}

/// Find a condition by type.
pub fn find_condition<'a>(conditions: &'a [FluxCondition], type_: &str) -> Option<&'a FluxCondition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// The condition with the latest transition time. Conditions without a
/// parseable time lose against any timed one; ties keep the later entry.
pub fn latest_condition(conditions: &[FluxCondition]) -> Option<&FluxCondition> {
    conditions
        .iter()
        .enumerate()
        .max_by_key(|(idx, c)| (c.transition_time(), *idx))
        .map(|(_, c)| c)
}

impl HelmRelease {
    /// Conditions reported by the release engine.
    pub fn conditions(&self) -> &[FluxCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// `(namespace, name)` of the HelmChart backing this release.
    pub fn helm_chart_ref(&self) -> Option<(String, String)> {
        let raw = self.status.as_ref()?.helm_chart.as_deref()?;
        let (namespace, name) = raw.split_once('/')?;
        Some((namespace.to_string(), name.to_string()))
    }
}

/// Source of chart artifacts created by Flux for each HelmRelease.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "HelmChart",
    plural = "helmcharts",
    namespaced,
    status = "HelmChartStatus",
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartSpec {
    /// Chart name.
    #[serde(default)]
    pub chart: String,
    /// Chart version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Observed state of a HelmChart.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartStatus {
    /// Reported conditions.
    #[serde(default)]
    pub conditions: Vec<FluxCondition>,
}

impl HelmChart {
    /// Conditions reported by the source controller.
    pub fn conditions(&self) -> &[FluxCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

/// Chart repository source.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "HelmRepository",
    plural = "helmrepositories",
    namespaced,
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositorySpec {
    /// Repository URL.
    pub url: String,
    /// Index refresh interval.
    pub interval: String,
    /// `oci` for OCI registries, absent for HTTP repositories.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub repo_type: Option<String>,
}
