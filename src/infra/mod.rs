//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod chrome;
pub mod error;
pub mod http;
pub mod store;
pub mod telemetry;
