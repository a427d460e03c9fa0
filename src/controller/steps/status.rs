//! App status from the release engine.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::kube_client::app_namespace;
use crate::controller::pipeline::{EnsureStep, StepOutcome};
use crate::controller::state::ReconcileState;
use crate::controller::status::{needs_chart, translate};
use crate::crd::flux::{HelmChart, HelmRelease};
use crate::crd::{App, AppStatus};

/// Overwrite the status of `app` when it differs from `status`.
///
/// Returns whether a write happened.
pub async fn write_status(ctx: &Context, app: &App, status: &AppStatus) -> Result<bool> {
    if app.status.as_ref() == Some(status) {
        return Ok(false);
    }
    ctx.kube
        .patch_app_status(&app_namespace(app)?, &app.name_any(), status)
        .await?;

    let previous = app.status.as_ref().and_then(|s| s.state());
    if let Some(state) = status.state().filter(|s| Some(*s) != previous) {
        info!(from = ?previous, to = %state, "Release state changed");
        if let Some(health) = ctx.health_state.as_ref() {
            health.metrics.record_state_transition(state.as_str());
        }
        if state.is_failure() {
            ctx.publish_warning_event(
                app,
                "ReleaseFailed",
                "Reconciling",
                Some(format!("{}: {}", state, status.release.reason)),
            )
            .await;
        } else {
            ctx.publish_normal_event(
                app,
                "ReleaseStateChanged",
                "Reconciling",
                Some(state.to_string()),
            )
            .await;
        }
    }
    Ok(true)
}

/// Reads the HelmRelease and reports its outcome on the App.
pub struct StatusStep {
    ctx: Arc<Context>,
}

impl StatusStep {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn chart_for(&self, release: &HelmRelease) -> Result<Option<HelmChart>> {
        if !needs_chart(release) {
            return Ok(None);
        }
        let Some((namespace, name)) = release.helm_chart_ref() else {
            return Ok(None);
        };
        self.ctx.kube.get_helm_chart(&namespace, &name).await
    }
}

#[async_trait]
impl EnsureStep for StatusStep {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn ensure_created(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        if state.status_override.is_some() {
            return Ok(StepOutcome::Continue);
        }
        let Some(release) = self
            .ctx
            .kube
            .get_release(&app_namespace(app)?, &app.name_any())
            .await?
        else {
            debug!("No HelmRelease yet");
            return Ok(StepOutcome::Continue);
        };

        let chart = self.chart_for(&release).await?;
        let status = translate(&release, chart.as_ref());
        if status == AppStatus::default() {
            debug!("Release engine has not reported yet");
            return Ok(StepOutcome::Continue);
        }
        write_status(&self.ctx, app, &status).await?;
        Ok(StepOutcome::Continue)
    }
}
