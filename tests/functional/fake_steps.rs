//! Recording fakes for pipeline steps.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use app_operator::controller::error::{Error, Result};
use app_operator::controller::pipeline::{CrudStep, Desired, EnsureStep, StepOutcome};
use app_operator::controller::remote::call_remote;
use app_operator::controller::state::ReconcileState;
use app_operator::crd::App;

/// Shared, ordered record of step calls.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// How a fake ensure-step fails before it succeeds.
#[derive(Clone, Copy, Debug)]
pub enum Failure {
    /// Fail with a retryable error this many times.
    Transient(u32),
    /// Always fail with a validation error.
    Invalid,
}

/// Ensure-step that records its calls.
pub struct FakeEnsure {
    name: &'static str,
    journal: Journal,
    outcome: StepOutcome,
    failure: Option<Failure>,
    failed: Mutex<u32>,
}

impl FakeEnsure {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            outcome: StepOutcome::Continue,
            failure: None,
            failed: Mutex::new(0),
        }
    }

    pub fn cancelling(mut self) -> Self {
        self.outcome = StepOutcome::Cancel;
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[async_trait]
impl EnsureStep for FakeEnsure {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn ensure_created(&self, _app: &App, _state: &mut ReconcileState) -> Result<StepOutcome> {
        self.journal.push(format!("{}:created", self.name));
        match self.failure {
            Some(Failure::Invalid) => Err(Error::Validation("bad spec".to_string())),
            Some(Failure::Transient(times)) => {
                let mut failed = self.failed.lock().unwrap();
                if *failed < times {
                    *failed += 1;
                    Err(Error::Transient("flaky".to_string()))
                } else {
                    Ok(self.outcome)
                }
            }
            None => Ok(self.outcome),
        }
    }

    async fn ensure_deleted(&self, _app: &App, _state: &mut ReconcileState) -> Result<StepOutcome> {
        self.journal.push(format!("{}:deleted", self.name));
        Ok(self.outcome)
    }
}

/// CRUD-step managing a single string "object".
pub struct FakeCrud {
    journal: Journal,
    stored: Arc<Mutex<Option<String>>>,
    desired: Desired<String>,
}

impl FakeCrud {
    pub fn new(journal: &Journal, stored: Option<&str>, desired: Desired<String>) -> Self {
        Self {
            journal: journal.clone(),
            stored: Arc::new(Mutex::new(stored.map(str::to_string))),
            desired,
        }
    }

    /// Handle to the stored object, for assertions after the run.
    pub fn stored(&self) -> Arc<Mutex<Option<String>>> {
        self.stored.clone()
    }
}

#[async_trait]
impl CrudStep for FakeCrud {
    type Resource = String;

    fn name(&self) -> &'static str {
        "object"
    }

    async fn observe(&self, _app: &App, _state: &mut ReconcileState) -> Result<Option<String>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn desired(
        &self,
        _app: &App,
        state: &mut ReconcileState,
        _current: Option<&String>,
    ) -> Result<Desired<String>> {
        if state.wants_absent() {
            return Ok(Desired::Absent);
        }
        Ok(self.desired.clone())
    }

    fn needs_update(&self, current: &String, desired: &String) -> bool {
        current != desired
    }

    async fn create(&self, _app: &App, desired: String) -> Result<()> {
        self.journal.push(format!("object:create:{}", desired));
        *self.stored.lock().unwrap() = Some(desired);
        Ok(())
    }

    async fn update(&self, _app: &App, _current: String, desired: String) -> Result<()> {
        self.journal.push(format!("object:update:{}", desired));
        *self.stored.lock().unwrap() = Some(desired);
        Ok(())
    }

    async fn delete(&self, _app: &App, current: String) -> Result<()> {
        self.journal.push(format!("object:delete:{}", current));
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

/// Ensure-step calling a remote cluster that never answers.
pub struct HangingRemoteCall {
    pub journal: Journal,
    pub timeout: Duration,
}

#[async_trait]
impl EnsureStep for HangingRemoteCall {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn ensure_created(&self, _app: &App, state: &mut ReconcileState) -> Result<StepOutcome> {
        self.journal.push("remote:created");
        let answer = call_remote(state, self.timeout, "remote", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await?;
        if answer.is_none() {
            self.journal.push("remote:timeout");
        }
        Ok(StepOutcome::Continue)
    }
}
