//! Reconciliation pipeline.
//!
//! A reconciliation runs a fixed list of steps in order. Ensure-steps make
//! something exist (or go away on deletion); CRUD-steps compare an observed
//! object with a desired one and create, update or delete it. Any step may
//! cancel the rest of the run, which ends the reconciliation successfully.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use super::error::Result;
use super::state::ReconcileState;
use crate::crd::App;
use crate::health::HealthState;
use crate::retry::RetryConfig;

/// What a step tells the pipeline to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run the next step.
    Continue,
    /// Skip every remaining step of this run.
    Cancel,
}

impl StepOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Continue => "continue",
            StepOutcome::Cancel => "cancel",
        }
    }
}

/// Result of a full pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every step ran.
    Completed,
    /// The named step cancelled the run.
    Cancelled { step: &'static str },
}

/// Desired state computed by a CRUD-step.
#[derive(Clone, Debug, PartialEq)]
pub enum Desired<R> {
    /// The object should exist like this.
    Present(R),
    /// The object should not exist.
    Absent,
    /// Nothing can be decided in this run; cancel the rest of it.
    Cancel,
}

/// A step that ensures something exists, or is gone on deletion.
#[async_trait]
pub trait EnsureStep: Send + Sync {
    /// Step name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Make sure the step's concern is in place.
    async fn ensure_created(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome>;

    /// Clean up on deletion. Does nothing unless overridden.
    async fn ensure_deleted(&self, _app: &App, _state: &mut ReconcileState) -> Result<StepOutcome> {
        Ok(StepOutcome::Continue)
    }
}

/// A step that drives one object towards a desired state.
#[async_trait]
pub trait CrudStep: Send + Sync {
    /// Object managed by this step.
    type Resource: Send + Sync;

    /// Step name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Read the current object.
    async fn observe(&self, app: &App, state: &mut ReconcileState) -> Result<Option<Self::Resource>>;

    /// Compute the desired object.
    async fn desired(
        &self,
        app: &App,
        state: &mut ReconcileState,
        current: Option<&Self::Resource>,
    ) -> Result<Desired<Self::Resource>>;

    /// Whether `current` must be rewritten to match `desired`.
    fn needs_update(&self, current: &Self::Resource, desired: &Self::Resource) -> bool;

    /// Create the object.
    async fn create(&self, app: &App, desired: Self::Resource) -> Result<()>;

    /// Replace `current` with `desired`.
    async fn update(&self, app: &App, current: Self::Resource, desired: Self::Resource) -> Result<()>;

    /// Delete the object.
    async fn delete(&self, app: &App, current: Self::Resource) -> Result<()>;
}

/// Object-safe form of [`CrudStep`].
#[async_trait]
pub trait DynCrudStep: Send + Sync {
    /// Step name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Observe, compare and apply.
    async fn reconcile(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome>;
}

#[async_trait]
impl<S> DynCrudStep for S
where
    S: CrudStep,
    S::Resource: 'static,
{
    fn name(&self) -> &'static str {
        CrudStep::name(self)
    }

    async fn reconcile(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        let current = self.observe(app, state).await?;
        match self.desired(app, state, current.as_ref()).await? {
            Desired::Cancel => Ok(StepOutcome::Cancel),
            Desired::Absent => {
                if let Some(current) = current {
                    self.delete(app, current).await?;
                }
                Ok(StepOutcome::Continue)
            }
            Desired::Present(desired) => {
                match current {
                    None => self.create(app, desired).await?,
                    Some(current) if self.needs_update(&current, &desired) => {
                        self.update(app, current, desired).await?
                    }
                    Some(_) => debug!(step = CrudStep::name(self), "Already up to date"),
                }
                Ok(StepOutcome::Continue)
            }
        }
    }
}

/// A pipeline step.
pub enum Step {
    /// Ensure-step.
    Ensure(Box<dyn EnsureStep>),
    /// CRUD-step.
    Crud(Box<dyn DynCrudStep>),
}

impl Step {
    /// Step name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Ensure(s) => s.name(),
            Step::Crud(s) => s.name(),
        }
    }

    async fn run(&self, app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        match self {
            Step::Ensure(s) if state.deleting => s.ensure_deleted(app, state).await,
            Step::Ensure(s) => s.ensure_created(app, state).await,
            Step::Crud(s) => s.reconcile(app, state).await,
        }
    }
}

/// Ordered list of steps with retry and instrumentation.
pub struct Pipeline {
    steps: Vec<Step>,
    retry: RetryConfig,
    health_state: Option<Arc<HealthState>>,
}

impl Pipeline {
    /// Create a pipeline running `steps` in order.
    pub fn new(steps: Vec<Step>, retry: RetryConfig, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            steps,
            retry,
            health_state,
        }
    }

    /// Names of the steps in run order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Run every step in order until one cancels or fails.
    ///
    /// A step that leaves the target cluster marked unavailable cancels the
    /// run as well.
    #[instrument(skip_all, fields(app = %app.name_any(), deleting = state.deleting))]
    pub async fn run(&self, app: &App, state: &mut ReconcileState) -> Result<PipelineOutcome> {
        for step in &self.steps {
            let name = step.name();
            let start = Instant::now();
            let result = self.run_with_retry(step, app, state).await;
            self.record(name, &result, start.elapsed().as_secs_f64());

            match result? {
                StepOutcome::Cancel => {
                    info!(step = name, "Step cancelled remaining steps");
                    return Ok(PipelineOutcome::Cancelled { step: name });
                }
                StepOutcome::Continue if state.cluster_unavailable => {
                    info!(step = name, "Target cluster unavailable, skipping remaining steps");
                    return Ok(PipelineOutcome::Cancelled { step: name });
                }
                StepOutcome::Continue => {}
            }
        }
        Ok(PipelineOutcome::Completed)
    }

    async fn run_with_retry(
        &self,
        step: &Step,
        app: &App,
        state: &mut ReconcileState,
    ) -> Result<StepOutcome> {
        let mut backoff = self.retry.backoff();
        loop {
            match step.run(app, state).await {
                Err(e) if e.is_retryable() => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            step = step.name(),
                            error = %e,
                            delay_ms = delay.as_millis(),
                            "Step failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
                other => return other,
            }
        }
    }

    fn record(&self, step: &str, result: &Result<StepOutcome>, secs: f64) {
        let Some(health) = self.health_state.as_ref() else {
            return;
        };
        let label = match result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        health.metrics.record_step(step, label, secs);
    }
}
