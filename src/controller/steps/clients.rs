//! Target cluster clients.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::CredentialError;
use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::pipeline::{EnsureStep, StepOutcome};
use crate::controller::remote::call_remote;
use crate::controller::state::ReconcileState;
use crate::crd::App;

/// Resolves clients for the target cluster and checks it can be reached.
pub struct ClientsStep {
    ctx: Arc<Context>,
}

impl ClientsStep {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Whether the kubeconfig Secret of a remote App is being deleted.
    async fn credentials_deleting(&self, app: &App) -> Result<bool> {
        let Some(secret) = app.spec.kube_config.secret.as_ref() else {
            return Ok(false);
        };
        self.ctx
            .kube
            .secret_deleting(&secret.namespace, &secret.name)
            .await
    }

    fn record_timeout(&self) {
        if let Some(health) = self.ctx.health_state.as_ref() {
            health.metrics.record_cluster_timeout();
        }
    }
}

#[async_trait]
impl EnsureStep for ClientsStep {
    fn name(&self) -> &'static str {
        "clients"
    }

    async fn ensure_created(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        let clients = match self.ctx.cluster_clients.get(&app.spec.kube_config).await {
            Ok(clients) => clients,
            Err(CredentialError::Kube(e)) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Target cluster unavailable");
                state.mark_cluster_unavailable();
                return Ok(StepOutcome::Cancel);
            }
        };

        if !clients.remote {
            state.clients = Some(clients);
            return Ok(StepOutcome::Continue);
        }

        if self.credentials_deleting(app).await? {
            info!("Kubeconfig secret is being deleted, removing release");
            state.cluster_deleting = true;
            state.clients = Some(clients);
            return Ok(StepOutcome::Continue);
        }

        let check = self
            .ctx
            .kube
            .check_cluster(clients.target.clone(), app.spec.namespace.clone());
        match call_remote(state, self.ctx.config.remote_timeout, "cluster-check", check).await {
            Ok(Some(reach)) => {
                debug!(
                    version = %reach.version,
                    namespace_exists = reach.namespace_exists,
                    "Target cluster reachable"
                );
                state.clients = Some(clients);
                Ok(StepOutcome::Continue)
            }
            Ok(None) => {
                self.record_timeout();
                Ok(StepOutcome::Cancel)
            }
            Err(e) => {
                warn!(error = %e, "Target cluster check failed");
                state.mark_cluster_unavailable();
                Ok(StepOutcome::Cancel)
            }
        }
    }
}
