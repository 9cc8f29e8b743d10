//! HTML bundles in, PDFs out.
//!
//! `domain` holds the bundle file system and render jobs, `application` the
//! services (templating, bundle registry, renderer pool, PDF orchestration),
//! `infra` the adapters (Chrome, S3, HTTP surfaces, telemetry).

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
