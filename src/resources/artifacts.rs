//! Configuration artifacts.
//!
//! Every loaded configuration source is copied next to the HelmRelease so
//! the release engine can read it through `valuesFrom`. Copies live in the
//! App namespace and are owned by the App.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::common::{owner_reference, standard_labels};
use crate::controller::descriptor::ARTIFACT_VALUES_KEY;
use crate::crd::App;
use crate::values::ConfigOverlay;

/// A configuration artifact ready to be applied.
#[derive(Clone, Debug, PartialEq)]
pub enum Artifact {
    /// Copy of a ConfigMap source.
    ConfigMap(ConfigMap),
    /// Copy of a Secret source.
    Secret(Secret),
}

impl Artifact {
    /// Object name of the artifact.
    pub fn name(&self) -> String {
        match self {
            Artifact::ConfigMap(cm) => cm.name_any(),
            Artifact::Secret(s) => s.name_any(),
        }
    }
}

fn metadata(app: &App, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: app.namespace(),
        labels: Some(standard_labels(app)),
        owner_references: Some(vec![owner_reference(app)]),
        ..Default::default()
    }
}

/// Generate the artifact for one overlay.
pub fn generate_artifact(app: &App, overlay: &ConfigOverlay) -> Result<Artifact, serde_yaml::Error> {
    let name = overlay.artifact_name(&app.name_any());
    let yaml = serde_yaml::to_string(&overlay.values)?;
    Ok(match overlay.kind {
        crate::crd::ConfigKind::ConfigMap => Artifact::ConfigMap(ConfigMap {
            metadata: metadata(app, name),
            data: Some(BTreeMap::from([(ARTIFACT_VALUES_KEY.to_string(), yaml)])),
            ..Default::default()
        }),
        crate::crd::ConfigKind::Secret => Artifact::Secret(Secret {
            metadata: metadata(app, name),
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(
                ARTIFACT_VALUES_KEY.to_string(),
                ByteString(yaml.into_bytes()),
            )])),
            ..Default::default()
        }),
    })
}
