//! app-operator library crate
//!
//! This module exports the controller, CRD definitions, caches, the chart
//! resolver and resource generators.

pub mod cache;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resolver;
pub mod resources;
pub mod retry;
pub mod values;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::{context::Context, reconciler::reconcile};
use controller::triggers::affected_apps;
use crd::{App, ConfigKind};
use crd::flux::HelmRelease;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration for all watches.
///
/// `any_semantic()` gives more reliable resource discovery in test
/// environments.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type with standard optimizations.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Filters out status-only updates via generation predicate
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);
    (reader, stream)
}

/// Run the App controller.
///
/// Watches Apps (cluster-wide, or in `config.watch_namespace`), the
/// HelmReleases they own and the ConfigMaps and Secrets they read or own.
/// It can be called from main.rs or spawned as a background task during
/// tests.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    info!(
        scope = namespace.unwrap_or("cluster-wide"),
        "Starting controller for App resources"
    );

    let ctx = match Context::new(client.clone(), config, health_state.clone()) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "Failed to build controller context");
            return;
        }
    };

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let apps: Api<App> = scoped_api(client.clone(), namespace);
    let releases: Api<HelmRelease> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);

    let watcher_config = default_watcher_config();
    let (reader, app_stream) = create_filtered_stream(apps, watcher_config.clone());
    let configmap_readers = reader.clone();
    let secret_readers = reader.clone();

    // HelmRelease status drives App status, so releases are watched in full.
    // ConfigMaps and Secrets only need change notifications; they map to the
    // App owning them as an artifact and to every App reading them.
    Controller::for_stream(app_stream, reader)
        .owns(releases, watcher_config.clone())
        .watches_stream(
            metadata_watcher(configmaps, watcher_config.clone()).touched_objects(),
            move |cm| affected_apps(&configmap_readers.state(), ConfigKind::ConfigMap, &cm.metadata),
        )
        .watches_stream(
            metadata_watcher(secrets, watcher_config).touched_objects(),
            move |secret| affected_apps(&secret_readers.state(), ConfigKind::Secret, &secret.metadata),
        )
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // NotFound errors are expected after deletion when related
                    // watch events trigger reconciliation for a deleted object.
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
