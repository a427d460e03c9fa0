// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for app-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/fixtures.rs"]
mod fixtures;

use std::time::Duration;

use jiff::{Timestamp, ToSpan};
use proptest::prelude::*;

use app_operator::controller::common::short_hash;
use app_operator::controller::descriptor::{build_desired, release_differs};
use app_operator::controller::pipeline::Desired;
use app_operator::controller::status::{classify_failure, translate};
use app_operator::controller::validation::cordon_requeue;
use app_operator::crd::flux::{CONDITION_READY, CONDITION_RELEASED};
use app_operator::crd::{ReleaseState, Repository, RepositoryType};
use app_operator::resolver::pick_repository;

use fixtures::{AppBuilder, CatalogBuilder, condition, inputs, release_on, resolved_chart};

/// Strategy for generating mirror counts (2-6).
fn mirror_count() -> impl Strategy<Value = usize> {
    2..=6usize
}

/// Strategy for generating chart versions.
fn version() -> impl Strategy<Value = String> {
    (0..20u32, 0..50u32, 0..100u32).prop_map(|(a, b, c)| format!("{}.{}.{}", a, b, c))
}

/// Strategy for generating Flux release reasons.
fn released_reason() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("InstallSucceeded"),
        Just("UpgradeSucceeded"),
        Just("RollbackSucceeded"),
        Just("TestSucceeded"),
        Just("UninstallSucceeded"),
        Just("InstallFailed"),
        Just("UpgradeFailed"),
        Just("RollbackFailed"),
        Just("UninstallFailed"),
        Just("TestFailed"),
        Just("Progressing"),
    ]
}

/// Strategy for generating Ready reasons.
fn ready_reason() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("ReconciliationSucceeded"),
        Just("ReconciliationFailed"),
        Just("Progressing"),
        Just("InitFailed"),
        Just("GetLastReleaseFailed"),
        Just("ArtifactFailed"),
        Just("DependencyNotReady"),
    ]
}

fn mirror(idx: usize) -> Repository {
    Repository::new(RepositoryType::Helm, format!("https://mirror-{}.example.com/charts", idx))
}

proptest! {
    /// Property: A healthy release stays on its mirror; an artifact failure
    /// moves it to the next one, wrapping at the end.
    #[test]
    fn test_mirror_round_robin(n in mirror_count(), current in 0..6usize, failed in any::<bool>()) {
        let current = current % n;
        let mut builder = CatalogBuilder::new("default", "https://storage.example.com/charts");
        for idx in 0..n {
            builder = builder.mirror(mirror(idx).url);
        }
        let catalog = builder.build();
        let reason = if failed { "ArtifactFailed" } else { "ReconciliationSucceeded" };
        let release = release_on(&mirror(current), vec![condition(CONDITION_READY, "False", reason, "")]);

        let picked = pick_repository(&catalog, Some(&release));
        let expected = if failed { (current + 1) % n } else { current };
        prop_assert_eq!(picked, mirror(expected));
    }

    /// Property: Every Helm failure message maps to a failure state.
    #[test]
    fn test_classify_failure_is_total(message in ".*") {
        let state = classify_failure(&message);
        prop_assert!(state.is_failure());
        prop_assert_eq!(state, classify_failure(&message));
    }

    /// Property: Schema violations win regardless of surrounding text.
    #[test]
    fn test_schema_violation_detected(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
        let message = format!("{}values don't meet the specifications of the schema(s){}", prefix, suffix);
        prop_assert_eq!(classify_failure(&message), ReleaseState::SchemaViolation);
    }

    /// Property: Translation is deterministic and a known Released reason
    /// always yields a state.
    #[test]
    fn test_translate_deterministic(released in released_reason(), ready in ready_reason(), message in "[a-z ]{0,30}") {
        let release = release_on(
            &mirror(0),
            vec![
                condition(CONDITION_RELEASED, "False", released, &message),
                condition(CONDITION_READY, "False", ready, &message),
            ],
        );
        let status = translate(&release, None);
        prop_assert_eq!(&status, &translate(&release, None));
        prop_assert!(status.state().is_some());
    }

    /// Property: A failed Released condition decides the state whatever the
    /// Ready condition says.
    #[test]
    fn test_released_failure_decides_state(
        released in prop_oneof![Just("InstallFailed"), Just("UpgradeFailed")],
        ready in ready_reason(),
    ) {
        let release = release_on(
            &mirror(0),
            vec![
                condition(CONDITION_READY, "False", ready, "reconciliation failed"),
                condition(
                    CONDITION_RELEASED,
                    "False",
                    released,
                    "values don't meet the specifications of the schema(s) in the following chart(s)",
                ),
            ],
        );
        prop_assert_eq!(translate(&release, None).state(), Some(ReleaseState::SchemaViolation));
    }

    /// Property: Building the release twice from the same inputs yields the
    /// same object, which never needs an update.
    #[test]
    fn test_build_desired_idempotent(v in version(), generation in 1..1000i64) {
        let app = AppBuilder::new("hello").version(v).generation(generation).build();
        let catalog = CatalogBuilder::new("default", "https://storage.example.com/charts").build();
        let chart = resolved_chart(&app, &catalog);

        let first = build_desired(&inputs(&app, &chart, &[])).unwrap();
        let second = build_desired(&inputs(&app, &chart, &[])).unwrap();
        prop_assert_eq!(&first, &second);
        let Desired::Present(release) = first else {
            panic!("expected a release");
        };
        prop_assert!(!release_differs(&release, &release));
    }

    /// Property: Short hashes are 8 lowercase hex characters and respect
    /// part boundaries.
    #[test]
    fn test_short_hash_shape(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let hash = short_hash(&[a.as_str(), b.as_str()]);
        prop_assert_eq!(hash.len(), 8);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        prop_assert_eq!(&hash, &short_hash(&[a.as_str(), b.as_str()]));
        let joined = format!("{}{}", a, b);
        prop_assert_ne!(hash, short_hash(&[joined.as_str()]));
    }

    /// Property: A cordon never delays the next tick by more than an hour.
    #[test]
    fn test_cordon_requeue_bounded(minutes in 0..10_000i64) {
        let now: Timestamp = "2024-06-01T00:00:00Z".parse().unwrap();
        let until = now.checked_add(minutes.minutes()).unwrap();
        let wait = cordon_requeue(until, now);
        prop_assert!(wait <= Duration::from_secs(3600));
        prop_assert_eq!(wait, Duration::from_secs((minutes.min(60) * 60) as u64));
    }
}
