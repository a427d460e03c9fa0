//! Shared controller helpers.

use kube::{Api, Resource, ResourceExt, api::PatchParams};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::controller::error::Error;

/// Field manager name used for every write.
pub const FIELD_MANAGER: &str = "app-operator";

/// Finalizer guarding removal of an App's HelmRelease.
pub const FINALIZER: &str = "appoperator.smoketurner.com/finalizer";

/// Label marking objects managed by this operator.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Label naming the App an object belongs to.
pub const LABEL_APP: &str = "appoperator.smoketurner.com/app";
/// Label naming the Catalog an App installs from.
pub const LABEL_CATALOG: &str = "appoperator.smoketurner.com/catalog";

/// First 8 hex characters of the SHA-256 of `parts`.
///
/// Parts are separated so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(8);
    hash
}

/// Add a finalizer to a resource.
pub async fn add_finalizer<T>(api: &Api<T>, name: &str, finalizer: &str) -> Result<(), Error>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let resource = api.get(name).await?;
    let mut finalizers = resource.finalizers().to_vec();

    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            name,
            &PatchParams::default(),
            &kube::api::Patch::Merge(&patch),
        )
        .await?;
    }
    Ok(())
}

/// Remove a specific finalizer from a resource.
pub async fn remove_finalizer<T>(api: &Api<T>, name: &str, finalizer: &str) -> Result<(), Error>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let Some(resource) = api.get_opt(name).await? else {
        return Ok(());
    };

    let mut finalizers = resource.finalizers().to_vec();
    if let Some(pos) = finalizers.iter().position(|f| f == finalizer) {
        finalizers.remove(pos);

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            name,
            &PatchParams::default(),
            &kube::api::Patch::Merge(&patch),
        )
        .await?;
    }
    Ok(())
}
