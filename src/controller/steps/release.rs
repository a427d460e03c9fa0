//! The HelmRelease of an App.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::descriptor::{DescriptorInputs, build_desired, release_differs};
use crate::controller::error::{Error, Result};
use crate::controller::kube_client::app_namespace;
use crate::controller::pipeline::{CrudStep, Desired};
use crate::controller::state::ReconcileState;
use crate::crd::App;
use crate::crd::flux::HelmRelease;
use crate::resolver::{pick_repository, resolve_chart};

/// Drives the HelmRelease towards the App.
pub struct ReleaseStep {
    ctx: Arc<Context>,
}

impl ReleaseStep {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Apps the dependency gate looks at.
    async fn siblings(&self, app: &App) -> Result<Vec<App>> {
        if app.spec.depends_on.is_empty() {
            return Ok(Vec::new());
        }
        self.ctx.kube.list_apps(&app_namespace(app)?).await
    }
}

#[async_trait]
impl CrudStep for ReleaseStep {
    type Resource = HelmRelease;

    fn name(&self) -> &'static str {
        "release"
    }

    async fn observe(&self, app: &App, _state: &mut ReconcileState) -> Result<Option<HelmRelease>> {
        self.ctx
            .kube
            .get_release(&app_namespace(app)?, &app.name_any())
            .await
    }

    async fn desired(
        &self,
        app: &App,
        state: &mut ReconcileState,
        current: Option<&HelmRelease>,
    ) -> Result<Desired<HelmRelease>> {
        if state.wants_absent() {
            return Ok(Desired::Absent);
        }

        let catalog = state
            .catalog
            .as_ref()
            .ok_or_else(|| Error::Contract("catalog must be loaded before release".to_string()))?;
        let picked = pick_repository(catalog, current);
        let chart = match resolve_chart(
            &self.ctx.indexes,
            catalog,
            &picked,
            &app.spec.name,
            &app.spec.version,
        )
        .await
        {
            Ok(chart) => chart,
            Err(e) => {
                warn!(
                    error = %e,
                    chart = %app.spec.name,
                    version = %app.spec.version,
                    "Chart could not be resolved"
                );
                state.set_override(e.state(), e.to_string());
                return Ok(Desired::Cancel);
            }
        };
        debug!(url = %chart.url, source = %chart.source_name, "Resolved chart");
        state.chart = Some(chart);

        let siblings = self.siblings(app).await?;
        let desired = build_desired(&DescriptorInputs {
            app,
            config: state.config.as_ref(),
            chart: state.chart.as_ref(),
            current,
            siblings: &siblings,
            deleting: false,
            now: Timestamp::now(),
        })?;
        if let Desired::Present(release) = &desired {
            state.dependencies_pending = release.spec.suspend;
        }
        Ok(desired)
    }

    fn needs_update(&self, current: &HelmRelease, desired: &HelmRelease) -> bool {
        release_differs(current, desired)
    }

    async fn create(&self, app: &App, desired: HelmRelease) -> Result<()> {
        self.ctx
            .kube
            .create_release(&app_namespace(app)?, &desired)
            .await?;
        info!(chart = %desired.spec.chart.spec.chart, "Created HelmRelease");
        self.ctx
            .publish_normal_event(
                app,
                "ReleaseCreated",
                "CreateRelease",
                Some(format!(
                    "Created HelmRelease for {} {}",
                    app.spec.name, app.spec.version
                )),
            )
            .await;
        Ok(())
    }

    async fn update(&self, app: &App, current: HelmRelease, mut desired: HelmRelease) -> Result<()> {
        desired.metadata.resource_version = current.resource_version();
        self.ctx
            .kube
            .replace_release(&app_namespace(app)?, &desired)
            .await?;
        info!(suspend = desired.spec.suspend, "Updated HelmRelease");
        if current.spec.chart.spec.version != desired.spec.chart.spec.version {
            self.ctx
                .publish_normal_event(
                    app,
                    "ReleaseUpdated",
                    "UpdateRelease",
                    Some(format!("Requested {} {}", app.spec.name, app.spec.version)),
                )
                .await;
        }
        Ok(())
    }

    async fn delete(&self, app: &App, current: HelmRelease) -> Result<()> {
        self.ctx
            .kube
            .delete_release(&app_namespace(app)?, &current.name_any())
            .await?;
        info!("Deleted HelmRelease");
        Ok(())
    }
}
