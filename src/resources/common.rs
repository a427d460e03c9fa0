//! Common resource generation utilities.
//!
//! Provides the labels and owner references shared by every object written
//! on behalf of an App.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::controller::common::{FIELD_MANAGER, LABEL_APP, LABEL_CATALOG, LABEL_MANAGED_BY};
use crate::crd::{App, passthrough_labels};

/// Standard labels applied to all managed resources.
///
/// App labels pass through; the operator's own labels always win.
pub fn standard_labels(app: &App) -> BTreeMap<String, String> {
    let mut labels = passthrough_labels(app);
    labels.insert(LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string());
    labels.insert(LABEL_APP.to_string(), app.name_any());
    labels.insert(LABEL_CATALOG.to_string(), app.spec.catalog.clone());
    labels
}

/// Label selector matching every object managed for `app`.
pub fn owned_selector(app: &App) -> String {
    format!(
        "{}={},{}={}",
        LABEL_MANAGED_BY,
        FIELD_MANAGER,
        LABEL_APP,
        app.name_any()
    )
}

/// Create a controller owner reference for an App
pub fn owner_reference(app: &App) -> OwnerReference {
    OwnerReference {
        api_version: App::api_version(&()).to_string(),
        kind: App::kind(&()).to_string(),
        name: app.name_any(),
        uid: app.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
