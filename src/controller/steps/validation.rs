//! Cordon, spec and Catalog checks.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::pipeline::{EnsureStep, StepOutcome};
use crate::controller::state::ReconcileState;
use crate::controller::validation::{Cordon, cordon_state, validate_spec};
use crate::crd::{App, Catalog, ReleaseState};

/// First step of every run.
pub struct ValidationStep {
    ctx: Arc<Context>,
}

impl ValidationStep {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn get_catalog(&self, app: &App) -> Result<Option<Catalog>> {
        self.ctx
            .kube
            .get_catalog(&app.spec.catalog_namespace, &app.spec.catalog)
            .await
    }
}

#[async_trait]
impl EnsureStep for ValidationStep {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn ensure_created(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        match cordon_state(app, Timestamp::now()) {
            Ok(Cordon::Inactive) => {}
            Ok(Cordon::Active { until, reason }) => {
                info!(until = %until, reason = %reason, "App is cordoned, skipping");
                state.cordoned_until = Some(until);
                return Ok(StepOutcome::Cancel);
            }
            Err(Error::Validation(msg)) => {
                state.set_override(ReleaseState::ValidationFailed, msg);
                return Ok(StepOutcome::Cancel);
            }
            Err(e) => return Err(e),
        }

        match validate_spec(app) {
            Ok(()) => {}
            Err(Error::Validation(msg)) => {
                warn!(error = %msg, "App spec is invalid");
                state.set_override(ReleaseState::ValidationFailed, msg);
                return Ok(StepOutcome::Cancel);
            }
            Err(e) => return Err(e),
        }

        let Some(catalog) = self.get_catalog(app).await? else {
            let reason = format!(
                "catalog {}/{} not found",
                app.spec.catalog_namespace, app.spec.catalog
            );
            warn!(catalog = %app.spec.catalog, namespace = %app.spec.catalog_namespace, "Catalog not found");
            state.set_override(ReleaseState::CatalogNotFound, reason);
            return Ok(StepOutcome::Cancel);
        };
        state.catalog = Some(catalog);
        Ok(StepOutcome::Continue)
    }

    async fn ensure_deleted(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        state.catalog = self.get_catalog(app).await?;
        if state.catalog.is_none() {
            debug!(catalog = %app.spec.catalog, "Catalog gone, deleting without it");
        }
        Ok(StepOutcome::Continue)
    }
}
