//! Data layer: shared Redis pool, cluster-state cache, job stream

pub mod cache;
pub mod redis;
pub mod stream;
