//! HelmRepository bootstrap.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::pipeline::{EnsureStep, StepOutcome};
use crate::controller::state::ReconcileState;
use crate::crd::App;
use crate::resources::repositories::generate_helm_repository;

/// Makes sure every location of the Catalog has a HelmRepository.
///
/// Sources are shared between Apps, so they are created when missing and
/// never updated or deleted here.
pub struct RepositoriesStep {
    ctx: Arc<Context>,
}

impl RepositoriesStep {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EnsureStep for RepositoriesStep {
    fn name(&self) -> &'static str {
        "repositories"
    }

    async fn ensure_created(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        let catalog = state
            .catalog
            .as_ref()
            .ok_or_else(|| Error::Contract("catalog must be loaded before repositories".to_string()))?;
        let catalog_name = catalog.name_any();
        let namespace = catalog
            .namespace()
            .unwrap_or_else(|| app.spec.catalog_namespace.clone());

        for repo in catalog.locations() {
            let source = generate_helm_repository(&catalog_name, &namespace, &repo);
            if self.ctx.kube.ensure_helm_repository(&namespace, &source).await? {
                info!(name = %source.name_any(), url = %repo.url, "Created HelmRepository");
            } else {
                debug!(name = %source.name_any(), "HelmRepository exists");
            }
        }
        Ok(StepOutcome::Continue)
    }
}
