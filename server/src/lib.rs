//! Sploot media clustering service
//!
//! Consumes clustering jobs from a durable broker stream with a consumer
//! group (at-least-once delivery, claim-based retry, dead-lettering), turns
//! each job into a deterministic per-pet cluster descriptor, caches it with
//! a TTL, and exposes the state to trusted internal callers over HTTP.

pub mod api;
pub mod app;
pub mod core;
pub mod data;
pub mod domain;
