//! Configuration artifacts.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::kube_client::app_namespace;
use crate::controller::pipeline::{EnsureStep, StepOutcome};
use crate::controller::state::ReconcileState;
use crate::crd::{App, ReleaseState};
use crate::resources::artifacts::generate_artifact;
use crate::resources::owned_selector;
use crate::values::ConfigError;

/// Loads configuration and writes one artifact per source.
pub struct ConfigStep {
    ctx: Arc<Context>,
}

impl ConfigStep {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Delete artifacts of `app` not named in `keep`.
    async fn prune(&self, app: &App, namespace: &str, keep: &BTreeSet<String>) -> Result<()> {
        let artifacts = self
            .ctx
            .kube
            .list_artifacts(namespace, &owned_selector(app))
            .await?;
        for (kind, name) in artifacts {
            if !keep.contains(&name) {
                self.ctx.kube.delete_artifact(namespace, kind, &name).await?;
                debug!(kind = %kind, name = %name, "Deleted stale artifact");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EnsureStep for ConfigStep {
    fn name(&self) -> &'static str {
        "config"
    }

    async fn ensure_created(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        let catalog = state
            .catalog
            .as_ref()
            .ok_or_else(|| Error::Contract("catalog must be loaded before config".to_string()))?;

        let merged = match self.ctx.merger.merge(app, catalog).await {
            Ok(merged) => merged,
            Err(ConfigError::Kube(e)) => return Err(e.into()),
            Err(e) => {
                let release_state = match e {
                    ConfigError::SourceNotFound { .. } => ReleaseState::ConfigNotFound,
                    _ => ReleaseState::ConfigParseError,
                };
                warn!(error = %e, "Configuration could not be loaded");
                state.set_override(release_state, e.to_string());
                return Ok(StepOutcome::Cancel);
            }
        };

        let namespace = app_namespace(app)?;
        let mut keep = BTreeSet::new();
        for overlay in &merged.overlays {
            let artifact = generate_artifact(app, overlay)?;
            keep.insert(artifact.name());
            self.ctx.kube.apply_artifact(&namespace, &artifact).await?;
        }
        self.prune(app, &namespace, &keep).await?;

        debug!(
            sources = merged.overlays.len(),
            revisions = ?merged.revisions(),
            "Configuration loaded"
        );
        state.config = Some(merged);
        Ok(StepOutcome::Continue)
    }

    async fn ensure_deleted(&self, app: &App, _state: &mut ReconcileState) -> Result<StepOutcome> {
        let namespace = app_namespace(app)?;
        self.prune(app, &namespace, &BTreeSet::new()).await?;
        info!("Deleted configuration artifacts");
        Ok(StepOutcome::Continue)
    }
}
