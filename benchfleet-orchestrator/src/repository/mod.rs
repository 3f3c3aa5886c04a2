//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for one table.

pub mod completion;
pub mod measurement;

pub use completion as completion_repository;
pub use measurement as measurement_repository;
