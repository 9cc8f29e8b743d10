//! Domain layer types and invariants.

pub mod bundle;
pub mod job;
