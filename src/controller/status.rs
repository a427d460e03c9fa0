//! Translation of Flux release conditions into App status.
//!
//! The `Released` condition describes the outcome of the last Helm action
//! and wins when it carries a known reason. Otherwise the `Ready` condition
//! decides. Failure messages are matched against known Helm errors so the
//! App owner sees the most specific state available.

use std::sync::LazyLock;

use regex::Regex;

use crate::crd::flux::{
    CONDITION_FETCH_FAILED, CONDITION_READY, CONDITION_RELEASED, CONDITION_STORAGE_FAILED,
    FluxCondition, HelmChart, HelmRelease, REASON_ARTIFACT_FAILED, find_condition,
};
use crate::crd::{AppStatus, ReleaseInfo, ReleaseState};

static INVALID_NAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(invalid release name|release name .* exceeds max length|metadata\.name: Invalid value|must consist of lower case alphanumeric characters)",
    )
    .ok()
});

type Detector = fn(&str) -> bool;

/// Known Helm failures, most specific first.
const DETECTORS: [(ReleaseState, Detector); 5] = [
    (ReleaseState::SchemaViolation, is_schema_violation),
    (ReleaseState::InvalidManifest, is_invalid_manifest),
    (ReleaseState::AlreadyExists, is_already_exists),
    (ReleaseState::InvalidName, is_invalid_name),
    (ReleaseState::ValidationFailed, is_validation_failed),
];

fn is_schema_violation(message: &str) -> bool {
    message.contains("values don't meet the specifications of the schema(s)")
}

fn is_invalid_manifest(message: &str) -> bool {
    message.contains("unable to build kubernetes objects from release manifest")
        || message.contains("error converting YAML to JSON")
        || message.contains("yaml: line")
}

fn is_already_exists(message: &str) -> bool {
    message.contains("rendered manifests contain a resource that already exists")
}

fn is_invalid_name(message: &str) -> bool {
    INVALID_NAME_RE
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

fn is_validation_failed(message: &str) -> bool {
    message.contains("error validating")
}

/// State for a failed Helm action with the given message.
pub fn classify_failure(message: &str) -> ReleaseState {
    DETECTORS
        .iter()
        .find(|(_, detect)| detect(message))
        .map(|(state, _)| *state)
        .unwrap_or(ReleaseState::Failed)
}

fn released_state(reason: &str, message: &str) -> Option<ReleaseState> {
    match reason {
        "InstallSucceeded" | "UpgradeSucceeded" | "RollbackSucceeded" | "TestSucceeded" => {
            Some(ReleaseState::Deployed)
        }
        "UninstallSucceeded" => Some(ReleaseState::Uninstalled),
        "InstallFailed" | "UpgradeFailed" | "RollbackFailed" | "UninstallFailed" | "TestFailed" => {
            Some(classify_failure(message))
        }
        _ => None,
    }
}

fn ready_state(reason: &str) -> ReleaseState {
    match reason {
        "InitFailed" | "GetLastReleaseFailed" => ReleaseState::Failed,
        "ReconciliationSucceeded" => ReleaseState::Deployed,
        "ReconciliationFailed" => ReleaseState::Unknown,
        "Progressing" => ReleaseState::Pending,
        _ => ReleaseState::Unknown,
    }
}

/// The HelmChart condition explaining an artifact failure, if any.
fn chart_pull_failure(chart: Option<&HelmChart>) -> Option<&FluxCondition> {
    chart?.conditions().iter().find(|c| {
        (c.type_ == CONDITION_FETCH_FAILED || c.type_ == CONDITION_STORAGE_FAILED) && c.is_true()
    })
}

/// Translate the observed state of a HelmRelease into App status.
///
/// Returns an empty status while Flux has reported neither condition.
pub fn translate(release: &HelmRelease, chart: Option<&HelmChart>) -> AppStatus {
    let conditions = release.conditions();

    let decided = find_condition(conditions, CONDITION_RELEASED)
        .and_then(|c| released_state(&c.reason, &c.message).map(|state| (state, c)))
        .or_else(|| {
            find_condition(conditions, CONDITION_READY).map(|c| {
                if c.reason == REASON_ARTIFACT_FAILED {
                    match chart_pull_failure(chart) {
                        Some(pull) => (ReleaseState::PackagePullFailed, pull),
                        None => (ReleaseState::Pending, c),
                    }
                } else {
                    (ready_state(&c.reason), c)
                }
            })
        });

    let Some((state, condition)) = decided else {
        return AppStatus::default();
    };

    let (version, app_version) = versions(release);
    AppStatus {
        app_version,
        version,
        release: ReleaseInfo {
            status: Some(state),
            reason: if condition.message.is_empty() {
                condition.reason.clone()
            } else {
                condition.message.clone()
            },
            last_deployed: condition.last_transition_time.clone(),
        },
    }
}

/// `(version, appVersion)` of the latest release snapshot.
fn versions(release: &HelmRelease) -> (String, String) {
    let Some(status) = release.status.as_ref() else {
        return (String::new(), String::new());
    };
    match status.history.first() {
        Some(latest) => (latest.chart_version.clone(), latest.app_version.clone()),
        None => (
            status.last_attempted_revision.clone().unwrap_or_default(),
            String::new(),
        ),
    }
}

/// Whether the Ready condition asks for the HelmChart to be inspected.
pub fn needs_chart(release: &HelmRelease) -> bool {
    find_condition(release.conditions(), CONDITION_READY)
        .is_some_and(|c| c.reason == REASON_ARTIFACT_FAILED)
        && !find_condition(release.conditions(), CONDITION_RELEASED)
            .is_some_and(|c| released_state(&c.reason, &c.message).is_some())
}
