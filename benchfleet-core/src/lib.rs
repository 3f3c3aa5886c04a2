//! Benchfleet Core
//!
//! Core types and algorithms shared by the orchestrator and the runners.
//!
//! This crate contains:
//! - Domain types: benchmarks, measurements, experiment setup and the catalog
//! - Schedule: the randomized execution order used by runners
//! - Codec: the length-framed record stream spoken on both TCP endpoints
//! - Environment: pre-run environment variables and shell commands

pub mod codec;
pub mod domain;
pub mod environment;
pub mod schedule;
