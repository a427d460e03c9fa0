//! Reconciliation loop for App.
//!
//! This module contains the main reconcile function that handles the lifecycle
//! of App custom resources: it runs the step pipeline, persists any status
//! the steps decided on, and releases the finalizer once the HelmRelease is
//! gone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use kube::{Api, ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::common::{FINALIZER, add_finalizer, remove_finalizer};
use crate::controller::context::Context;
use crate::controller::error::Error;
use crate::controller::pipeline::PipelineOutcome;
use crate::controller::state::{ReconcileState, StatusOverride};
use crate::controller::steps::{standard_pipeline, write_status};
use crate::controller::validation::cordon_requeue;
use crate::crd::{App, AppStatus, ReleaseInfo, ReleaseState};

/// Requeue while the target cluster cannot be reached.
pub const UNAVAILABLE_REQUEUE: Duration = Duration::from_secs(60);

/// Requeue while the release waits for its dependencies.
pub const DEPENDENCY_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue while the release engine uninstalls a deleted App.
pub const DELETION_REQUEUE: Duration = Duration::from_secs(5);

/// Reconcile an App
///
/// This is the main reconciliation function called by the controller.
/// It handles the full lifecycle: creation, updates, and deletion.
#[instrument(skip_all, fields(name = %obj.name_any(), namespace = %obj.namespace().unwrap_or_default()))]
pub async fn reconcile(obj: Arc<App>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
    let api: Api<App> = Api::namespaced(ctx.client.clone(), &namespace);
    let deleting = obj.metadata.deletion_timestamp.is_some();
    let has_finalizer = obj.finalizers().iter().any(|f| f == FINALIZER);

    if deleting && !has_finalizer {
        debug!("Deleted App without finalizer, nothing to do");
        return Ok(Action::await_change());
    }

    // Ensure finalizer is present
    if !has_finalizer {
        info!("Adding finalizer");
        add_finalizer(&api, &name, FINALIZER).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    debug!(deleting, "Reconciling App");

    let mut state = ReconcileState::new(deleting);
    let pipeline = standard_pipeline(ctx.clone());
    let outcome = pipeline.run(&obj, &mut state).await;

    // Decided statuses are persisted even when a later step failed.
    if let Some(status_override) = state.status_override.as_ref().filter(|_| !deleting) {
        let status = override_status(&obj, status_override);
        write_status(&ctx, &obj, &status).await?;
    }
    let outcome = outcome?;

    if let PipelineOutcome::Cancelled { step } = outcome {
        debug!(step, "Pipeline cancelled");
    }

    if deleting {
        return finish_deletion(&obj, &ctx, &api, &namespace).await;
    }

    // Record metrics
    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
    }

    Ok(Action::requeue(requeue_after(
        &state,
        ctx.config.resync_interval,
        Timestamp::now(),
    )))
}

/// Remove the finalizer once the HelmRelease is gone.
async fn finish_deletion(
    obj: &App,
    ctx: &Context,
    api: &Api<App>,
    namespace: &str,
) -> Result<Action, Error> {
    let name = obj.name_any();
    if ctx.kube.get_release(namespace, &name).await?.is_some() {
        debug!("Waiting for HelmRelease to be uninstalled");
        return Ok(Action::requeue(DELETION_REQUEUE));
    }

    info!("HelmRelease gone, removing finalizer");
    remove_finalizer(api, &name, FINALIZER).await?;
    ctx.publish_normal_event(
        obj,
        "Deleted",
        "Deleting",
        Some(format!("Uninstalled {} from {}", obj.spec.name, obj.spec.namespace)),
    )
    .await;
    Ok(Action::await_change())
}

/// Status written for a decided override.
///
/// Installed versions are kept: the previous release may still be running.
pub fn override_status(app: &App, status_override: &StatusOverride) -> AppStatus {
    let current = app.status.clone().unwrap_or_default();
    AppStatus {
        app_version: current.app_version,
        version: current.version,
        release: ReleaseInfo {
            status: Some(status_override.state),
            reason: status_override.reason.clone(),
            last_deployed: current.release.last_deployed,
        },
    }
}

/// How long to wait before the next tick.
pub fn requeue_after(state: &ReconcileState, resync: Duration, now: Timestamp) -> Duration {
    if let Some(until) = state.cordoned_until {
        return cordon_requeue(until, now).min(resync);
    }
    if state.cluster_unavailable {
        return UNAVAILABLE_REQUEUE;
    }
    if state.dependencies_pending {
        return DEPENDENCY_REQUEUE.min(resync);
    }
    match state.status_override.as_ref().map(|o| o.state) {
        Some(ReleaseState::IndexUnreachable) => UNAVAILABLE_REQUEUE,
        _ => resync,
    }
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<App>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}
