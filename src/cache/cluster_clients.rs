//! Cluster client cache.
//!
//! Building a client for a remote cluster means reading its kubeconfig
//! Secret and setting up a fresh connection, so resolved clients are kept
//! per credential reference for a while.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::TtlCache;
use crate::crd::KubeConfigSpec;

/// Key under which a kubeconfig Secret stores its kubeconfig.
pub const KUBECONFIG_SECRET_KEY: &str = "kubeConfig";

/// Connect timeout applied to remote cluster clients.
const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to obtain clients for a target cluster.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The kubeconfig Secret, or its key, does not exist.
    #[error("credentials not found: {0}")]
    NotFound(String),

    /// The credentials exist but do not yield a usable client.
    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    /// Reading the Secret from the local cluster failed.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Clients used by one reconciliation.
#[derive(Clone)]
pub struct ClusterClients {
    /// Client for the cluster the chart is installed into.
    pub target: Client,
    /// Whether `target` points at a remote cluster.
    pub remote: bool,
}

impl ClusterClients {
    /// Clients for installing into the local cluster.
    pub fn local(client: Client) -> Self {
        Self {
            target: client,
            remote: false,
        }
    }
}

/// Turns a credential reference into clients.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve clients for the given credentials.
    async fn resolve(&self, spec: &KubeConfigSpec) -> Result<ClusterClients, CredentialError>;
}

/// Resolves credentials from kubeconfig Secrets in the local cluster.
pub struct KubeCredentialResolver {
    local: Client,
}

impl KubeCredentialResolver {
    /// Create a resolver reading Secrets through `local`.
    pub fn new(local: Client) -> Self {
        Self { local }
    }
}

#[async_trait]
impl CredentialResolver for KubeCredentialResolver {
    async fn resolve(&self, spec: &KubeConfigSpec) -> Result<ClusterClients, CredentialError> {
        let Some(secret_ref) = spec.secret.as_ref().filter(|_| spec.is_remote()) else {
            return Ok(ClusterClients::local(self.local.clone()));
        };

        let secrets: Api<Secret> = Api::namespaced(self.local.clone(), &secret_ref.namespace);
        let secret = secrets.get_opt(&secret_ref.name).await?.ok_or_else(|| {
            CredentialError::NotFound(format!(
                "secret {}/{}",
                secret_ref.namespace, secret_ref.name
            ))
        })?;

        let raw = secret
            .data
            .as_ref()
            .and_then(|d| d.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| {
                CredentialError::NotFound(format!(
                    "key {} in secret {}/{}",
                    KUBECONFIG_SECRET_KEY, secret_ref.namespace, secret_ref.name
                ))
            })?;
        let yaml = std::str::from_utf8(&raw.0)
            .map_err(|e| CredentialError::Unreachable(format!("kubeconfig is not UTF-8: {}", e)))?;

        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .map_err(|e| CredentialError::Unreachable(format!("invalid kubeconfig: {}", e)))?;
        let options = KubeConfigOptions {
            context: spec.context.clone(),
            ..Default::default()
        };
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| CredentialError::Unreachable(format!("failed to load kubeconfig: {}", e)))?;
        config.connect_timeout = Some(REMOTE_CONNECT_TIMEOUT);

        let target = Client::try_from(config)
            .map_err(|e| CredentialError::Unreachable(format!("failed to create client: {}", e)))?;

        debug!(secret = %secret_ref.name, namespace = %secret_ref.namespace, "Built remote cluster client");
        Ok(ClusterClients {
            target,
            remote: true,
        })
    }
}

/// Read-through cache of cluster clients keyed by credential reference.
pub struct ClusterClientCache {
    cache: TtlCache<String, ClusterClients>,
    resolver: Arc<dyn CredentialResolver>,
}

impl ClusterClientCache {
    /// Create a cache that resolves misses through `resolver`.
    pub fn new(resolver: Arc<dyn CredentialResolver>, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            resolver,
        }
    }

    /// Clients for `spec`, resolved on a miss or after expiry.
    pub async fn get(&self, spec: &KubeConfigSpec) -> Result<ClusterClients, CredentialError> {
        let key = spec.cache_key();
        self.cache
            .get_or_try_insert_with(&key, || self.resolver.resolve(spec))
            .await
    }
}
