//! Domain layer: jobs, cluster state, strategies and the worker loop

pub mod cluster;
pub mod job;
pub mod strategy;
pub mod worker;

pub use cluster::{Cluster, ClusterDescriptor, ClusterMember, ClusterMetrics};
pub use job::{ClusterJob, JobPayload};
pub use strategy::{ClusterStrategy, HeuristicStrategy, StrategyParams};
pub use worker::{ClusterWorker, WorkerConfig};
