//! Application services.

pub mod assets;
pub mod bundles;
pub mod error;
pub mod pdf;
pub mod render;
pub mod store;
pub mod templating;
