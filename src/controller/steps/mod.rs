//! Standard reconciliation steps.
//!
//! | Step | Kind | Concern |
//! |------|------|---------|
//! | validation | ensure | cordon, spec checks, Catalog lookup |
//! | repositories | ensure | one HelmRepository per Catalog location |
//! | clients | ensure | target cluster clients and reachability |
//! | config | ensure | configuration artifacts |
//! | release | CRUD | the HelmRelease |
//! | status | ensure | App status from the release engine |

use std::sync::Arc;

use super::context::Context;
use super::pipeline::{Pipeline, Step};

pub mod clients;
pub mod config;
pub mod release;
pub mod repositories;
pub mod status;
pub mod validation;


pub use clients::ClientsStep;
pub use config::ConfigStep;
pub use release::ReleaseStep;
pub use repositories::RepositoriesStep;
pub use status::{StatusStep, write_status};
pub use validation::ValidationStep;

/// The pipeline every App runs through.
pub fn standard_pipeline(ctx: Arc<Context>) -> Pipeline {
    let retry = ctx.config.step_retry();
    let health_state = ctx.health_state.clone();
    Pipeline::new(
        vec![
            Step::Ensure(Box::new(ValidationStep::new(ctx.clone()))),
            Step::Ensure(Box::new(RepositoriesStep::new(ctx.clone()))),
            Step::Ensure(Box::new(ClientsStep::new(ctx.clone()))),
            Step::Ensure(Box::new(ConfigStep::new(ctx.clone()))),
            Step::Crud(Box::new(ReleaseStep::new(ctx.clone()))),
            Step::Ensure(Box::new(StatusStep::new(ctx))),
        ],
        retry,
        health_state,
    )
}
