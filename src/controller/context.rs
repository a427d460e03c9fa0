//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler:
//! the Kubernetes clients, the caches and the configuration merger.

use std::sync::Arc;

use kube::Client;
use kube::runtime::events::EventType;

use crate::cache::{ClusterClientCache, HttpIndexFetcher, IndexCache, KubeCredentialResolver};
use crate::config::OperatorConfig;
use crate::controller::kube_client::{KubeClient, KubeClientImpl};
use crate::crd::App;
use crate::health::HealthState;
use crate::values::{ConfigMerger, KubeConfigMerger};

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for the local cluster
    pub client: Client,
    /// Step access to the local cluster
    pub kube: Arc<dyn KubeClient>,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Operator settings
    pub config: OperatorConfig,
    /// Clients per target cluster
    pub cluster_clients: Arc<ClusterClientCache>,
    /// Catalog repository indexes
    pub indexes: Arc<IndexCache>,
    /// Loads App configuration
    pub merger: Arc<dyn ConfigMerger>,
}

impl Context {
    /// Create a context backed by the production collaborators.
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Result<Self, reqwest::Error> {
        let fetcher = HttpIndexFetcher::new(config.remote_timeout)?;
        let cluster_clients = Arc::new(ClusterClientCache::new(
            Arc::new(KubeCredentialResolver::new(client.clone())),
            config.client_ttl,
        ));
        let indexes = Arc::new(IndexCache::new(Arc::new(fetcher), config.index_ttl));
        Ok(Self {
            kube: Arc::new(KubeClientImpl::new(client.clone())),
            merger: Arc::new(KubeConfigMerger::new(client.clone())),
            client,
            health_state,
            config,
            cluster_clients,
            indexes,
        })
    }

    /// Publish a normal event for an App
    pub async fn publish_normal_event(&self, app: &App, reason: &str, action: &str, note: Option<String>) {
        self.kube
            .publish_event(app, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for an App
    pub async fn publish_warning_event(&self, app: &App, reason: &str, action: &str, note: Option<String>) {
        self.kube
            .publish_event(app, EventType::Warning, reason, action, note)
            .await;
    }
}
