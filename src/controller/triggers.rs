//! Apps affected by a change to a ConfigMap or Secret.
//!
//! Artifacts are owned by their App. Sources are only referenced from the
//! App spec, so the App store is searched for readers.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube::runtime::reflector::ObjectRef;

use crate::crd::{App, ConfigKind, ConfigSpec};

/// Apps to reconcile after the `kind` object described by `meta` changed.
///
/// Catalog-level sources are not traced here and are picked up at resync.
pub fn affected_apps(apps: &[Arc<App>], kind: ConfigKind, meta: &ObjectMeta) -> Vec<ObjectRef<App>> {
    let (Some(name), Some(namespace)) = (meta.name.as_deref(), meta.namespace.as_deref()) else {
        return Vec::new();
    };

    let mut refs: Vec<ObjectRef<App>> = meta
        .owner_references
        .iter()
        .flatten()
        .filter(|o| o.kind == App::kind(&()) && o.api_version == App::api_version(&()))
        .map(|o| ObjectRef::new(&o.name).within(namespace))
        .collect();

    for app in apps.iter().filter(|app| reads_source(app, kind, namespace, name)) {
        let app_ref = ObjectRef::from_obj(&**app);
        if !refs.contains(&app_ref) {
            refs.push(app_ref);
        }
    }
    refs
}

/// Whether `app` takes values from the `kind` object `namespace/name`.
fn reads_source(app: &App, kind: ConfigKind, namespace: &str, name: &str) -> bool {
    let spec = &app.spec;
    let layered = [spec.config.as_ref(), spec.user_config.as_ref()]
        .into_iter()
        .flatten()
        .filter_map(|config: &ConfigSpec| match kind {
            ConfigKind::ConfigMap => config.config_map.as_ref(),
            ConfigKind::Secret => config.secret.as_ref(),
        })
        .any(|source| source.name == name && source.namespace == namespace);

    layered
        || spec
            .extra_configs
            .iter()
            .any(|extra| extra.kind == kind && extra.name == name && extra.namespace == namespace)
}
