//! Custom Resource Definitions (CRDs) for app-operator.
//!
//! - `App`: install a catalog chart into a local or remote cluster
//! - `Catalog`: a named set of chart repositories
//!
//! The `flux` module types the Flux objects the operator manages; they are
//! served by Flux, not by this operator.

mod app;
mod catalog;
pub mod flux;

pub use app::*;
pub use catalog::*;
