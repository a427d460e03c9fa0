//! Validation logic for App specs.
//!
//! This module provides:
//! - Required field checks
//! - Timeout and dependency checks
//! - Cordon evaluation

use std::sync::LazyLock;

use jiff::{Timestamp, ToSpan};
use kube::ResourceExt;
use regex::Regex;

use crate::controller::error::{Error, Result};
use crate::crd::{App, TimeoutPolicy};

/// Helm limit on release names.
pub const MAX_RELEASE_NAME_LENGTH: usize = 53;

/// Validate the App spec
pub fn validate_spec(app: &App) -> Result<()> {
    validate_required(app)?;
    validate_release_name(app)?;
    validate_timeouts(app)?;
    validate_kube_config(app)?;
    Ok(())
}

fn validate_required(app: &App) -> Result<()> {
    let spec = &app.spec;
    for (field, value) in [
        ("spec.name", &spec.name),
        ("spec.version", &spec.version),
        ("spec.catalog", &spec.catalog),
        ("spec.namespace", &spec.namespace),
    ] {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("{} must not be empty", field)));
        }
    }
    Ok(())
}

fn validate_release_name(app: &App) -> Result<()> {
    let name = app.name_any();
    if name.len() > MAX_RELEASE_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "release name {} exceeds maximum length of {} characters",
            name, MAX_RELEASE_NAME_LENGTH
        )));
    }
    Ok(())
}

/// Timeouts are Go durations such as `5m` or `1h30m`.
fn validate_timeouts(app: &App) -> Result<()> {
    let spec = &app.spec;
    for (field, policy) in [
        ("spec.install.timeout", &spec.install),
        ("spec.upgrade.timeout", &spec.upgrade),
        ("spec.rollback.timeout", &spec.rollback),
        ("spec.uninstall.timeout", &spec.uninstall),
    ] {
        let Some(timeout) = policy.as_ref().and_then(|p: &TimeoutPolicy| p.timeout.as_deref()) else {
            continue;
        };
        if !is_go_duration(timeout) {
            return Err(Error::Validation(format!(
                "{} {:?} is not a valid duration",
                field, timeout
            )));
        }
    }
    Ok(())
}

fn validate_kube_config(app: &App) -> Result<()> {
    let kube_config = &app.spec.kube_config;
    if !kube_config.in_cluster && kube_config.secret.is_none() {
        return Err(Error::Validation(
            "spec.kubeConfig.secret is required when inCluster is false".to_string(),
        ));
    }
    if let Some(secret) = kube_config.secret.as_ref().filter(|_| !kube_config.in_cluster)
        && app.namespace().is_some_and(|ns| ns != secret.namespace)
    {
        return Err(Error::Validation(format!(
            "kubeconfig secret {}/{} must live in the App namespace",
            secret.namespace, secret.name
        )));
    }
    Ok(())
}

/// Durations as accepted by the HelmRelease CRD.
static GO_DURATION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9]+(\.[0-9]+)?(ms|s|m|h))+$").ok());

/// Whether `value` is a sequence of `<number><unit>` with units h, m, s or ms.
fn is_go_duration(value: &str) -> bool {
    GO_DURATION_RE
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

/// Cordon state of an App at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cordon {
    /// Not cordoned, or the cordon lapsed.
    Inactive,
    /// Cordoned until the given time.
    Active { until: Timestamp, reason: String },
}

/// Evaluate the cordon of `app` at `now`.
pub fn cordon_state(app: &App, now: Timestamp) -> Result<Cordon> {
    let Some(cordon) = app.spec.cordon.as_ref() else {
        return Ok(Cordon::Inactive);
    };
    let until: Timestamp = cordon.until.parse().map_err(|e| {
        Error::Validation(format!(
            "spec.cordon.until {:?} is not an RFC 3339 timestamp: {}",
            cordon.until, e
        ))
    })?;
    if until > now {
        Ok(Cordon::Active {
            until,
            reason: cordon.reason.clone(),
        })
    } else {
        Ok(Cordon::Inactive)
    }
}

/// Time until a cordon lapses, capped at one hour.
pub fn cordon_requeue(until: Timestamp, now: Timestamp) -> std::time::Duration {
    let cap = now.checked_add(1.hour()).unwrap_or(now);
    let wake = until.min(cap);
    let span = wake.duration_since(now);
    std::time::Duration::try_from(span).unwrap_or_default()
}
