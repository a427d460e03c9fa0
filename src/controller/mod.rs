//! Controller module for app-operator.
//!
//! Contains the reconciliation loop, the step pipeline, error handling,
//! status translation, and validation logic.

// Shared modules
pub mod common;
pub mod context;
pub mod error;
pub mod kube_client;
pub mod state;

// Pipeline
pub mod pipeline;
pub mod reconciler;
pub mod remote;
pub mod steps;
pub mod triggers;

// Pure decision logic
pub mod dependencies;
pub mod descriptor;
pub mod status;
pub mod validation;
