//! Pluggable clustering strategies
//!
//! A strategy is a pure transformation from a job to a cluster descriptor:
//! no I/O, and byte-identical output for identical inputs. That determinism
//! is what makes at-least-once delivery safe: a replayed job overwrites the
//! cache with the same bytes.
//!
//! The trait is fallible so an embedding-backed implementation (which calls
//! out to a model) can satisfy the same contract; the heuristic never fails.

mod heuristic;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use heuristic::HeuristicStrategy;

use crate::domain::cluster::ClusterDescriptor;
use crate::domain::job::ClusterJob;

/// Strategy tuning knobs taken from configuration
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Upper bound on members per cluster
    pub max_cluster_size: usize,
}

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("strategy failed: {0}")]
    Failed(String),
}

/// The pluggable pure function turning a job into a cluster descriptor.
///
/// `processed_at` is supplied by the caller so the transformation itself
/// stays deterministic and unit-testable.
pub trait ClusterStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Version stamped into descriptor metrics for future routing
    fn version(&self) -> &'static str;

    fn cluster(
        &self,
        job: &ClusterJob,
        params: &StrategyParams,
        processed_at: DateTime<Utc>,
    ) -> Result<ClusterDescriptor, StrategyError>;
}
