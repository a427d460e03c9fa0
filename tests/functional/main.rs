// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the App reconciliation pipeline and chart resolution.
//!
//! These tests drive the pipeline and the resolver end to end WITHOUT a live
//! Kubernetes cluster. Steps and index fetchers are replaced by fakes that
//! record every call.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_cancel_skips_remaining_steps
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Pipeline tests**: step ordering, cancellation, retries, deletion and
//!   cluster quarantine
//! - **Resolution tests**: mirror selection and index verification across
//!   catalog shapes

#[path = "../common/fixtures.rs"]
mod fixtures;

mod fake_steps;
mod pipeline_tests;
mod resolution_tests;
