//! Core domain types
//!
//! These structures are shared between the orchestrator (which builds the
//! catalog and accumulates results) and the runners (which execute it).

pub mod benchmark;
pub mod catalog;
pub mod setup;

pub use benchmark::{Benchmark, Measurement, SENTINEL_NAME};
pub use catalog::Catalog;
pub use setup::{Setup, SetupError};
