//! Per-reconciliation scratch state.
//!
//! Created when a reconciliation starts and dropped when it ends. Steps read
//! what earlier steps wrote, so the state is passed by `&mut` through the
//! whole pipeline.

use jiff::Timestamp;

use crate::cache::ClusterClients;
use crate::crd::{Catalog, ReleaseState};
use crate::resolver::ResolvedChart;
use crate::values::MergedConfig;

/// A status the reconciler must write regardless of what the release engine
/// reports, e.g. because the chart could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusOverride {
    /// State to report.
    pub state: ReleaseState,
    /// Human-readable reason.
    pub reason: String,
}

/// Scratch state of one reconciliation.
#[derive(Default)]
pub struct ReconcileState {
    /// Catalog the App installs from, once loaded.
    pub catalog: Option<Catalog>,
    /// Clients for the target cluster, once resolved.
    pub clients: Option<ClusterClients>,
    /// Loaded configuration, once merged.
    pub config: Option<MergedConfig>,
    /// Chart verified for the desired release.
    pub chart: Option<ResolvedChart>,
    /// Status to persist after the pipeline.
    pub status_override: Option<StatusOverride>,
    /// Set when the target cluster failed or timed out during this run.
    pub cluster_unavailable: bool,
    /// Set when the target cluster's credentials are being deleted.
    pub cluster_deleting: bool,
    /// Set when the App itself is being deleted.
    pub deleting: bool,
    /// The release is suspended until dependencies are installed.
    pub dependencies_pending: bool,
    /// End of an active cordon that cancelled this run.
    pub cordoned_until: Option<Timestamp>,
}

impl ReconcileState {
    /// State for an App that is or is not being deleted.
    pub fn new(deleting: bool) -> Self {
        Self {
            deleting,
            ..Default::default()
        }
    }

    /// Record a status to persist after the pipeline.
    pub fn set_override(&mut self, state: ReleaseState, reason: impl Into<String>) {
        self.status_override = Some(StatusOverride {
            state,
            reason: reason.into(),
        });
    }

    /// Quarantine the target cluster for the rest of this run.
    pub fn mark_cluster_unavailable(&mut self) {
        self.cluster_unavailable = true;
    }

    /// Whether the desired HelmRelease is "none".
    pub fn wants_absent(&self) -> bool {
        self.deleting || self.cluster_deleting
    }
}
