//! Kubernetes access of the reconciliation steps.
//!
//! Steps talk to the local cluster through the `KubeClient` trait so they
//! can run against a mock in tests. `KubeClientImpl` is the production
//! implementation backed by a `kube::Client`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::controller::common::FIELD_MANAGER;
use crate::controller::error::{Error, Result};
use crate::crd::flux::{HelmChart, HelmRelease, HelmRepository};
use crate::crd::{App, AppStatus, Catalog, ConfigKind};
use crate::resources::artifacts::Artifact;

/// What a reachability check of a target cluster found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterReach {
    /// Git version reported by the API server.
    pub version: String,
    /// Whether the install namespace exists yet.
    pub namespace_exists: bool,
}

/// Kubernetes operations performed by the reconciliation steps.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a Catalog, `None` when it does not exist.
    async fn get_catalog(&self, namespace: &str, name: &str) -> Result<Option<Catalog>>;

    /// Create a HelmRepository unless one with the same name exists.
    ///
    /// Returns whether it was created by this call.
    async fn ensure_helm_repository(&self, namespace: &str, source: &HelmRepository) -> Result<bool>;

    /// Whether the Secret `namespace/name` exists and is being deleted.
    async fn secret_deleting(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Check that `target` answers and whether `namespace` exists there.
    ///
    /// The returned future owns everything it needs so it can run as its
    /// own task under a deadline.
    fn check_cluster(&self, target: Client, namespace: String) -> BoxFuture<'static, Result<ClusterReach>>;

    /// Server-side apply a configuration artifact.
    async fn apply_artifact(&self, namespace: &str, artifact: &Artifact) -> Result<()>;

    /// Names of the artifacts matching `selector`, per kind.
    async fn list_artifacts(&self, namespace: &str, selector: &str) -> Result<Vec<(ConfigKind, String)>>;

    /// Delete an artifact; a missing one is not an error.
    async fn delete_artifact(&self, namespace: &str, kind: ConfigKind, name: &str) -> Result<()>;

    /// Get a HelmRelease, `None` when it does not exist.
    async fn get_release(&self, namespace: &str, name: &str) -> Result<Option<HelmRelease>>;

    /// Create a HelmRelease.
    async fn create_release(&self, namespace: &str, release: &HelmRelease) -> Result<()>;

    /// Replace a HelmRelease; `release` carries the expected resourceVersion.
    async fn replace_release(&self, namespace: &str, release: &HelmRelease) -> Result<()>;

    /// Delete a HelmRelease; a missing one is not an error.
    async fn delete_release(&self, namespace: &str, name: &str) -> Result<()>;

    /// All Apps in a namespace.
    async fn list_apps(&self, namespace: &str) -> Result<Vec<App>>;

    /// Get a HelmChart, `None` when it does not exist.
    async fn get_helm_chart(&self, namespace: &str, name: &str) -> Result<Option<HelmChart>>;

    /// Overwrite the status of an App.
    async fn patch_app_status(&self, namespace: &str, name: &str, status: &AppStatus) -> Result<()>;

    /// Publish an event for an App. Failures are logged, not returned.
    async fn publish_event(
        &self,
        app: &App,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// `KubeClient` backed by the local cluster.
pub struct KubeClientImpl {
    client: Client,
    reporter: Reporter,
}

impl KubeClientImpl {
    /// Create a client reporting events as `FIELD_MANAGER`.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

async fn delete_ignoring_missing<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!(name = %name, "Already gone");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_catalog(&self, namespace: &str, name: &str) -> Result<Option<Catalog>> {
        let api: Api<Catalog> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn ensure_helm_repository(&self, namespace: &str, source: &HelmRepository) -> Result<bool> {
        let api: Api<HelmRepository> = Api::namespaced(self.client.clone(), namespace);
        let name = source.name_any();
        if api.get_opt(&name).await?.is_some() {
            return Ok(false);
        }
        match api.create(&Self::post_params(), source).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(name = %name, "HelmRepository created concurrently");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn secret_deleting(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_opt(name)
            .await?
            .is_some_and(|s| s.metadata.deletion_timestamp.is_some()))
    }

    fn check_cluster(&self, target: Client, namespace: String) -> BoxFuture<'static, Result<ClusterReach>> {
        Box::pin(async move {
            let version = target.apiserver_version().await?;
            let namespaces: Api<Namespace> = Api::all(target);
            let namespace_exists = namespaces.get_opt(&namespace).await?.is_some();
            Ok(ClusterReach {
                version: version.git_version,
                namespace_exists,
            })
        })
    }

    async fn apply_artifact(&self, namespace: &str, artifact: &Artifact) -> Result<()> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        match artifact {
            Artifact::ConfigMap(cm) => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                api.patch(&cm.name_any(), &params, &Patch::Apply(cm)).await?;
            }
            Artifact::Secret(secret) => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                api.patch(&secret.name_any(), &params, &Patch::Apply(secret))
                    .await?;
            }
        }
        Ok(())
    }

    async fn list_artifacts(&self, namespace: &str, selector: &str) -> Result<Vec<(ConfigKind, String)>> {
        let lp = ListParams::default().labels(selector);
        let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        let mut names: Vec<(ConfigKind, String)> = configmaps
            .list_metadata(&lp)
            .await?
            .into_iter()
            .map(|cm| (ConfigKind::ConfigMap, cm.name_any()))
            .collect();
        names.extend(
            secrets
                .list_metadata(&lp)
                .await?
                .into_iter()
                .map(|s| (ConfigKind::Secret, s.name_any())),
        );
        Ok(names)
    }

    async fn delete_artifact(&self, namespace: &str, kind: ConfigKind, name: &str) -> Result<()> {
        match kind {
            ConfigKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                delete_ignoring_missing(&api, name).await
            }
            ConfigKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                delete_ignoring_missing(&api, name).await
            }
        }
    }

    async fn get_release(&self, namespace: &str, name: &str) -> Result<Option<HelmRelease>> {
        let api: Api<HelmRelease> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_release(&self, namespace: &str, release: &HelmRelease) -> Result<()> {
        let api: Api<HelmRelease> = Api::namespaced(self.client.clone(), namespace);
        api.create(&Self::post_params(), release).await?;
        Ok(())
    }

    async fn replace_release(&self, namespace: &str, release: &HelmRelease) -> Result<()> {
        let api: Api<HelmRelease> = Api::namespaced(self.client.clone(), namespace);
        api.replace(&release.name_any(), &Self::post_params(), release)
            .await?;
        Ok(())
    }

    async fn delete_release(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<HelmRelease> = Api::namespaced(self.client.clone(), namespace);
        delete_ignoring_missing(&api, name).await
    }

    async fn list_apps(&self, namespace: &str) -> Result<Vec<App>> {
        let api: Api<App> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_helm_chart(&self, namespace: &str, name: &str) -> Result<Option<HelmChart>> {
        let api: Api<HelmChart> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_app_status(&self, namespace: &str, name: &str, status: &AppStatus) -> Result<()> {
        let api: Api<App> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn publish_event(
        &self,
        app: &App,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        let object_ref = app.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }
}

/// Namespace of `app`; its HelmRelease and artifacts live there too.
pub(crate) fn app_namespace(app: &App) -> Result<String> {
    app.namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))
}
