use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::store::{BundleInfo, BundleSummary, Store, StoreError};

/// Process-local store, used in tests and when running without an object store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<String, BundleInfo>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save(&self, info: &BundleInfo) -> Result<(), StoreError> {
        let mut stored = info.clone();
        stored.rename_from = None;
        stored.size = stored.data.len() as u64;
        self.objects.write().insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<BundleInfo, StoreError> {
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(name))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.objects
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(name))
    }

    async fn list_info(&self, prefix: &str) -> Result<Vec<BundleSummary>, StoreError> {
        Ok(self
            .objects
            .read()
            .values()
            .filter(|info| info.name.starts_with(prefix))
            .map(BundleInfo::summary)
            .collect())
    }
}
