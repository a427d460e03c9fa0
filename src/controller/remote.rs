//! Bounded calls into remote clusters.
//!
//! A remote call runs as its own task while the reconciliation waits on it
//! with a deadline. When the deadline passes the cluster is quarantined for
//! the rest of the run and every later remote call returns without being
//! issued.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::{Error, Result};
use super::state::ReconcileState;

/// Run `call` against a remote cluster with a deadline.
///
/// Returns `Ok(None)` when the cluster is already quarantined or the call
/// timed out; in the latter case the cluster is quarantined. Errors of the
/// call itself are returned unchanged.
pub async fn call_remote<T, F>(
    state: &mut ReconcileState,
    timeout: Duration,
    operation: &str,
    call: F,
) -> Result<Option<T>>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    if state.cluster_unavailable {
        return Ok(None);
    }

    let handle = tokio::spawn(call);
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result.map(Some),
        Ok(Err(join_error)) => Err(Error::Transient(format!(
            "remote call {} did not complete: {}",
            operation, join_error
        ))),
        Err(_) => {
            abort.abort();
            warn!(
                operation = %operation,
                timeout_ms = timeout.as_millis(),
                "Remote call timed out, marking cluster unavailable"
            );
            state.mark_cluster_unavailable();
            Ok(None)
        }
    }
}
