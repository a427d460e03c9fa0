//! Expiring read-through caches shared by all reconciliations.
//!
//! - `cluster_clients`: API clients per credential reference
//! - `catalog_index`: parsed chart repository indexes per URL

pub mod catalog_index;
pub mod cluster_clients;
mod ttl;

pub use catalog_index::{ChartIndex, ChartVersion, HttpIndexFetcher, IndexCache, IndexError, IndexFetcher};
pub use cluster_clients::{
    ClusterClientCache, ClusterClients, CredentialError, CredentialResolver, KubeCredentialResolver,
};
pub use ttl::TtlCache;
