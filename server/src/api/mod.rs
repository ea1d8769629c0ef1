//! Internal HTTP surface

pub mod auth;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod types;

use std::sync::Arc;

use crate::data::cache::ClusterCache;
use crate::data::stream::StreamService;

pub use server::ApiServer;
pub use types::ApiError;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub streams: Arc<StreamService>,
    pub cache: Arc<ClusterCache>,
}
