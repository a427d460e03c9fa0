//! Pipeline behavior with recording fake steps.

use std::sync::Arc;
use std::time::Duration;

use app_operator::HealthState;
use app_operator::controller::pipeline::{Desired, Pipeline, PipelineOutcome, Step};
use app_operator::controller::state::ReconcileState;
use app_operator::retry::RetryConfig;

use crate::fake_steps::{FakeCrud, FakeEnsure, Failure, HangingRemoteCall, Journal};
use crate::fixtures::AppBuilder;

fn ensure(step: FakeEnsure) -> Step {
    Step::Ensure(Box::new(step))
}

#[tokio::test]
async fn test_steps_run_in_order() {
    let journal = Journal::default();
    let crud = FakeCrud::new(&journal, None, Desired::Present("v1".to_string()));
    let stored = crud.stored();
    let pipeline = Pipeline::new(
        vec![
            ensure(FakeEnsure::new("validation", &journal)),
            ensure(FakeEnsure::new("config", &journal)),
            Step::Crud(Box::new(crud)),
            ensure(FakeEnsure::new("status", &journal)),
        ],
        RetryConfig::none(),
        None,
    );
    assert_eq!(pipeline.step_names(), vec!["validation", "config", "object", "status"]);

    let app = AppBuilder::new("hello").build();
    let mut state = ReconcileState::new(false);
    let outcome = pipeline.run(&app, &mut state).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Completed);
    assert_eq!(
        journal.entries(),
        vec!["validation:created", "config:created", "object:create:v1", "status:created"]
    );
    assert_eq!(stored.lock().unwrap().as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_cancel_skips_remaining_steps() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![
            ensure(FakeEnsure::new("validation", &journal)),
            ensure(FakeEnsure::new("clients", &journal).cancelling()),
            Step::Crud(Box::new(FakeCrud::new(&journal, None, Desired::Present("v1".to_string())))),
        ],
        RetryConfig::none(),
        None,
    );

    let app = AppBuilder::new("hello").build();
    let outcome = pipeline.run(&app, &mut ReconcileState::new(false)).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Cancelled { step: "clients" });
    assert_eq!(journal.entries(), vec!["validation:created", "clients:created"]);
}

#[tokio::test]
async fn test_crud_update_and_noop() {
    let journal = Journal::default();
    let app = AppBuilder::new("hello").build();

    let outdated = Pipeline::new(
        vec![Step::Crud(Box::new(FakeCrud::new(
            &journal,
            Some("v1"),
            Desired::Present("v2".to_string()),
        )))],
        RetryConfig::none(),
        None,
    );
    outdated.run(&app, &mut ReconcileState::new(false)).await.unwrap();

    let current = Pipeline::new(
        vec![Step::Crud(Box::new(FakeCrud::new(
            &journal,
            Some("v2"),
            Desired::Present("v2".to_string()),
        )))],
        RetryConfig::none(),
        None,
    );
    current.run(&app, &mut ReconcileState::new(false)).await.unwrap();

    assert_eq!(journal.entries(), vec!["object:update:v2"]);
}

#[tokio::test]
async fn test_crud_cancel_decision() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![
            Step::Crud(Box::new(FakeCrud::new(&journal, Some("v1"), Desired::Cancel))),
            ensure(FakeEnsure::new("status", &journal)),
        ],
        RetryConfig::none(),
        None,
    );

    let app = AppBuilder::new("hello").build();
    let outcome = pipeline.run(&app, &mut ReconcileState::new(false)).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Cancelled { step: "object" });
    assert!(journal.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![
            ensure(FakeEnsure::new("config", &journal).failing(Failure::Transient(2))),
            ensure(FakeEnsure::new("status", &journal)),
        ],
        RetryConfig::with_max_attempts(3),
        None,
    );

    let app = AppBuilder::new("hello").build();
    let outcome = pipeline.run(&app, &mut ReconcileState::new(false)).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Completed);
    assert_eq!(journal.count("config:created"), 3);
    assert_eq!(journal.count("status:created"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![
            ensure(FakeEnsure::new("config", &journal).failing(Failure::Transient(10))),
            ensure(FakeEnsure::new("status", &journal)),
        ],
        RetryConfig::with_max_attempts(3),
        None,
    );

    let app = AppBuilder::new("hello").build();
    let err = pipeline.run(&app, &mut ReconcileState::new(false)).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(journal.count("config:created"), 3);
    assert_eq!(journal.count("status:created"), 0);
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![ensure(FakeEnsure::new("validation", &journal).failing(Failure::Invalid))],
        RetryConfig::with_max_attempts(5),
        None,
    );

    let app = AppBuilder::new("hello").build();
    assert!(pipeline.run(&app, &mut ReconcileState::new(false)).await.is_err());
    assert_eq!(journal.count("validation:created"), 1);
}

#[tokio::test]
async fn test_deletion_runs_cleanup_path() {
    let journal = Journal::default();
    let crud = FakeCrud::new(&journal, Some("v1"), Desired::Present("v1".to_string()));
    let stored = crud.stored();
    let pipeline = Pipeline::new(
        vec![
            ensure(FakeEnsure::new("config", &journal)),
            Step::Crud(Box::new(crud)),
        ],
        RetryConfig::none(),
        None,
    );

    let app = AppBuilder::new("hello").build();
    let outcome = pipeline.run(&app, &mut ReconcileState::new(true)).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Completed);
    assert_eq!(journal.entries(), vec!["config:deleted", "object:delete:v1"]);
    assert!(stored.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_deleting_cluster_removes_release() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![Step::Crud(Box::new(FakeCrud::new(
            &journal,
            Some("v1"),
            Desired::Present("v1".to_string()),
        )))],
        RetryConfig::none(),
        None,
    );

    let app = AppBuilder::new("hello").remote("acme-kubeconfig").build();
    let mut state = ReconcileState::new(false);
    state.cluster_deleting = true;
    pipeline.run(&app, &mut state).await.unwrap();

    assert_eq!(journal.entries(), vec!["object:delete:v1"]);
}

#[tokio::test(start_paused = true)]
async fn test_remote_timeout_quarantines_cluster() {
    let journal = Journal::default();
    let pipeline = Pipeline::new(
        vec![
            Step::Ensure(Box::new(HangingRemoteCall {
                journal: journal.clone(),
                timeout: Duration::from_secs(5),
            })),
            ensure(FakeEnsure::new("config", &journal)),
        ],
        RetryConfig::none(),
        None,
    );

    let app = AppBuilder::new("hello").remote("acme-kubeconfig").build();
    let mut state = ReconcileState::new(false);
    let outcome = pipeline.run(&app, &mut state).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Cancelled { step: "remote" });
    assert!(state.cluster_unavailable);
    assert_eq!(journal.entries(), vec!["remote:created", "remote:timeout"]);
}

#[tokio::test]
async fn test_step_metrics_are_recorded() {
    let journal = Journal::default();
    let health = Arc::new(HealthState::new());
    let pipeline = Pipeline::new(
        vec![
            ensure(FakeEnsure::new("validation", &journal)),
            ensure(FakeEnsure::new("clients", &journal).cancelling()),
        ],
        RetryConfig::none(),
        Some(health.clone()),
    );

    let app = AppBuilder::new("hello").build();
    pipeline.run(&app, &mut ReconcileState::new(false)).await.unwrap();

    let metrics = health.metrics.encode();
    assert!(metrics.contains(r#"appoperator_step_executions_total{step="validation",result="continue"} 1"#));
    assert!(metrics.contains(r#"appoperator_step_executions_total{step="clients",result="cancel"} 1"#));
}
