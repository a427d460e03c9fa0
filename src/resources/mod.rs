//! Resource generation module.
//!
//! Contains generators for the objects written on behalf of an App.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | HelmRepository | Chart source per Catalog location (shared) |
//! | ConfigMap / Secret | Copy of each configuration source, read via `valuesFrom` |
//!
//! The HelmRelease itself is built by `controller::descriptor`.

pub mod artifacts;
pub mod common;
pub mod repositories;

// Re-export commonly used items from common
pub use common::{owned_selector, owner_reference, standard_labels};
