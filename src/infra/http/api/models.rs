use serde::{Deserialize, Serialize};

use crate::application::render::PoolStats;
use crate::application::store::BundleSummary;

#[derive(Debug, Serialize, Deserialize)]
pub struct SavedBundleResponse {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct BundleListResponse {
    pub items: Vec<BundleSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BundleListQuery {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pool: PoolStats,
    #[serde(rename = "registeredBundles")]
    pub registered_bundles: usize,
    #[serde(rename = "storeConfigured")]
    pub store_configured: bool,
}
