//! Persistent bundle storage contract.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Objects live under this prefix in the backing store.
pub const BUNDLE_KEY_PREFIX: &str = "bundles/";

pub const DEFAULT_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bundle `{name}` not found")]
    NotFound { name: String },
    #[error("no bundle store is configured")]
    Unavailable,
    #[error("bundle store failure: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// A persisted bundle: metadata plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleInfo {
    pub name: String,
    pub template_engine: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub data: Bytes,
    /// Previous name to drop after a successful save.
    pub rename_from: Option<String>,
}

impl BundleInfo {
    pub fn new(name: impl Into<String>, template_engine: impl Into<String>, data: Bytes) -> Self {
        let name = name.into();
        Self {
            file_name: format!("{name}.zip"),
            name,
            template_engine: template_engine.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            size: data.len() as u64,
            data,
            rename_from: None,
        }
    }

    pub fn summary(&self) -> BundleSummary {
        BundleSummary {
            name: self.name.clone(),
            template_engine: self.template_engine.clone(),
            size: self.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSummary {
    pub name: String,
    pub template_engine: String,
    pub size: u64,
}

pub fn object_key(name: &str) -> String {
    format!("{BUNDLE_KEY_PREFIX}{name}")
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn save(&self, info: &BundleInfo) -> Result<(), StoreError>;

    async fn get(&self, name: &str) -> Result<BundleInfo, StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Summaries of every bundle whose name starts with `prefix`, sorted by name.
    async fn list_info(&self, prefix: &str) -> Result<Vec<BundleSummary>, StoreError>;
}
