//! Desired HelmRelease of an App.
//!
//! Building is pure: everything it depends on, including the current time,
//! is passed in, so identical inputs always produce an identical object.

use std::collections::BTreeMap;

use jiff::Timestamp;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::common::short_hash;
use super::dependencies::missing_dependencies;
use super::error::{Error, Result};
use super::pipeline::Desired;
use crate::cache::cluster_clients::KUBECONFIG_SECRET_KEY;
use crate::crd::flux::{
    ANNOTATION_REQUESTED_AT, CrossNamespaceObjectReference, DELETION_PROPAGATION_BACKGROUND,
    HelmChartTemplate, HelmChartTemplateSpec, HelmRelease, HelmReleaseSpec, Install,
    KubeConfigReference, Rollback, SecretKeyReference, Uninstall, Upgrade, ValuesReference,
};
use crate::crd::{App, TimeoutPolicy};
use crate::resources::{owner_reference, standard_labels};
use crate::resolver::ResolvedChart;
use crate::values::MergedConfig;

/// Why the release is suspended.
pub const ANNOTATION_PAUSE_REASON: &str = "appoperator.smoketurner.com/pause-reason";
/// When the release was first suspended.
pub const ANNOTATION_PAUSE_STARTED: &str = "appoperator.smoketurner.com/pause-started";
/// Digest of the revisions of every configuration source.
pub const ANNOTATION_CONFIG_REVISION: &str = "appoperator.smoketurner.com/config-revision";

/// Reconcile interval handed to the release engine.
pub const RELEASE_INTERVAL: &str = "10m";

/// Key under which configuration artifacts store their values.
pub const ARTIFACT_VALUES_KEY: &str = "values.yaml";

/// Everything the desired HelmRelease depends on.
pub struct DescriptorInputs<'a> {
    /// The App being reconciled.
    pub app: &'a App,
    /// Loaded configuration, if any.
    pub config: Option<&'a MergedConfig>,
    /// Verified chart; required unless the release should be absent.
    pub chart: Option<&'a ResolvedChart>,
    /// HelmRelease currently in the cluster.
    pub current: Option<&'a HelmRelease>,
    /// Apps in the same namespace.
    pub siblings: &'a [App],
    /// The App or its target cluster is going away.
    pub deleting: bool,
    /// Time used for new pause timestamps.
    pub now: Timestamp,
}

/// Build the HelmRelease `inputs` call for.
pub fn build_desired(inputs: &DescriptorInputs<'_>) -> Result<Desired<HelmRelease>> {
    if inputs.deleting {
        return Ok(Desired::Absent);
    }

    let app = inputs.app;
    let chart = inputs
        .chart
        .ok_or_else(|| Error::Contract("chart must be resolved before building a release".to_string()))?;
    let name = app.name_any();
    let namespace = app
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    let overlays = inputs.config.map(|c| c.overlays.as_slice()).unwrap_or_default();
    let values_from = overlays
        .iter()
        .map(|o| ValuesReference {
            kind: o.kind.to_string(),
            name: o.artifact_name(&name),
            values_key: Some(ARTIFACT_VALUES_KEY.to_string()),
        })
        .collect();
    let revisions = inputs.config.map(MergedConfig::revisions).unwrap_or_default();
    let config_revision = short_hash(&revisions);

    let generation = app.metadata.generation.unwrap_or_default().to_string();
    let mut annotations = BTreeMap::from([
        (ANNOTATION_CONFIG_REVISION.to_string(), config_revision.clone()),
        (
            ANNOTATION_REQUESTED_AT.to_string(),
            short_hash(&[generation.as_str(), config_revision.as_str()]),
        ),
    ]);

    let missing = missing_dependencies(app, inputs.siblings);
    let suspend = !missing.is_empty();
    if suspend {
        annotations.insert(
            ANNOTATION_PAUSE_REASON.to_string(),
            format!("waiting for dependencies: {}", missing.join(", ")),
        );
        annotations.insert(
            ANNOTATION_PAUSE_STARTED.to_string(),
            pause_started(inputs.current).unwrap_or_else(|| inputs.now.to_string()),
        );
    }

    let kube_config = app
        .spec
        .kube_config
        .secret
        .as_ref()
        .filter(|_| app.spec.kube_config.is_remote())
        .map(|secret| KubeConfigReference {
            secret_ref: SecretKeyReference {
                name: secret.name.clone(),
                key: Some(KUBECONFIG_SECRET_KEY.to_string()),
            },
        });

    let spec = HelmReleaseSpec {
        chart: HelmChartTemplate {
            spec: HelmChartTemplateSpec {
                chart: chart.chart.clone(),
                version: Some(chart.version.clone()),
                source_ref: CrossNamespaceObjectReference {
                    kind: "HelmRepository".to_string(),
                    name: chart.source_name.clone(),
                    namespace: Some(app.spec.catalog_namespace.clone()),
                },
            },
        },
        interval: RELEASE_INTERVAL.to_string(),
        release_name: Some(name.clone()),
        target_namespace: Some(app.spec.namespace.clone()),
        storage_namespace: Some(app.spec.namespace.clone()),
        suspend,
        kube_config,
        install: Some(Install {
            timeout: timeout(&app.spec.install),
            create_namespace: true,
            disable_openapi_validation: true,
        }),
        upgrade: Some(Upgrade {
            timeout: timeout(&app.spec.upgrade),
            disable_openapi_validation: true,
        }),
        rollback: Some(Rollback {
            timeout: timeout(&app.spec.rollback),
        }),
        uninstall: Some(Uninstall {
            timeout: timeout(&app.spec.uninstall),
            deletion_propagation: Some(DELETION_PROPAGATION_BACKGROUND.to_string()),
        }),
        values_from,
    };

    Ok(Desired::Present(HelmRelease {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(standard_labels(app)),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(app)]),
            ..Default::default()
        },
        spec,
        status: None,
    }))
}

fn timeout(policy: &Option<TimeoutPolicy>) -> Option<String> {
    policy.as_ref().and_then(|p| p.timeout.clone())
}

/// Pause timestamp to keep when the current release is already suspended.
fn pause_started(current: Option<&HelmRelease>) -> Option<String> {
    let current = current.filter(|r| r.spec.suspend)?;
    current.annotations().get(ANNOTATION_PAUSE_STARTED).cloned()
}

/// Whether an existing HelmRelease differs from the desired one in anything
/// this operator owns.
pub fn release_differs(current: &HelmRelease, desired: &HelmRelease) -> bool {
    current.spec != desired.spec
        || current.metadata.labels != desired.metadata.labels
        || current.metadata.annotations != desired.metadata.annotations
        || current.metadata.owner_references != desired.metadata.owner_references
}
