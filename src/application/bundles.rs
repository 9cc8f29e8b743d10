//! Ephemeral bundle registry plus a thin façade over the persistent store.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::bundle::Bundle;

use super::store::{BundleInfo, BundleSummary, Store, StoreError};

type Registry = RwLock<HashMap<Uuid, Arc<Bundle>>>;

pub struct BundleProvider {
    registry: Arc<Registry>,
    store: Option<Arc<dyn Store>>,
}

impl BundleProvider {
    pub fn new(store: Option<Arc<dyn Store>>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Register a bundle under a fresh id. Dropping the guard unregisters it.
    pub fn provide(&self, bundle: Bundle) -> Registration {
        let id = Uuid::new_v4();
        self.registry.write().insert(id, Arc::new(bundle));
        debug!(
            target = "pressroom::bundles",
            op = "provide",
            bundle_id = %id,
            "bundle registered"
        );
        Registration {
            id,
            registry: Some(Arc::clone(&self.registry)),
        }
    }

    pub fn get_by_id(&self, id: &Uuid) -> Option<Arc<Bundle>> {
        self.registry.read().get(id).cloned()
    }

    /// Returns whether an entry was present.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.registry.write().remove(id).is_some()
    }

    pub fn registered(&self) -> usize {
        self.registry.read().len()
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Persist a bundle. A rename drops the previous object once the new one is stored.
    pub async fn save(&self, info: &BundleInfo) -> Result<(), StoreError> {
        let store = self.store()?;
        store.save(info).await?;

        let Some(previous) = info
            .rename_from
            .as_deref()
            .map(str::trim)
            .filter(|previous| !previous.is_empty() && *previous != info.name)
        else {
            return Ok(());
        };

        match store.delete(previous).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(err) => {
                warn!(
                    target = "pressroom::bundles",
                    op = "save",
                    name = %info.name,
                    rename_from = previous,
                    error = %err,
                    "failed to delete renamed bundle"
                );
            }
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<BundleInfo, StoreError> {
        self.store()?.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.store()?.delete(name).await
    }

    pub async fn list_info(&self, prefix: &str) -> Result<Vec<BundleSummary>, StoreError> {
        self.store()?.list_info(prefix).await
    }

    fn store(&self) -> Result<&Arc<dyn Store>, StoreError> {
        self.store.as_ref().ok_or(StoreError::Unavailable)
    }
}

/// Live ephemeral registration; the entry disappears when this guard is released or dropped.
#[derive(Debug)]
pub struct Registration {
    id: Uuid,
    registry: Option<Arc<Registry>>,
}

impl Registration {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn release(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.write().remove(&self.id);
            debug!(
                target = "pressroom::bundles",
                op = "release",
                bundle_id = %self.id,
                "bundle released"
            );
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::infra::store::InMemoryStore;

    fn bundle() -> Bundle {
        let mut bundle = Bundle::new();
        bundle
            .add_file("index.html", Bytes::from_static(b"<p>hi</p>"))
            .expect("valid name");
        bundle
    }

    #[test]
    fn registration_is_released_on_drop() {
        let provider = BundleProvider::new(None);
        let id = {
            let registration = provider.provide(bundle());
            assert!(provider.get_by_id(&registration.id()).is_some());
            registration.id()
        };
        assert!(provider.get_by_id(&id).is_none());
        assert_eq!(provider.registered(), 0);
    }

    #[test]
    fn release_and_remove_are_idempotent() {
        let provider = BundleProvider::new(None);
        let mut registration = provider.provide(bundle());
        let id = registration.id();

        assert!(provider.remove(&id));
        assert!(!provider.remove(&id));
        registration.release();
        registration.release();
        drop(registration);

        assert!(provider.get_by_id(&id).is_none());
    }

    #[test]
    fn concurrent_registrations_get_distinct_ids() {
        let provider = BundleProvider::new(None);
        let first = provider.provide(bundle());
        let second = provider.provide(bundle());
        assert_ne!(first.id(), second.id());
        assert_eq!(provider.registered(), 2);
    }

    #[tokio::test]
    async fn persistent_operations_need_a_store() {
        let provider = BundleProvider::new(None);
        assert!(matches!(
            provider.get("invoice").await,
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(
            provider.list_info("").await,
            Err(StoreError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let provider = BundleProvider::new(Some(Arc::new(InMemoryStore::new())));
        let info = BundleInfo::new("invoice", "golang", Bytes::from_static(b"PK-bytes"));
        provider.save(&info).await.expect("save");

        let stored = provider.get("invoice").await.expect("get");
        assert_eq!(stored.data, info.data);
        assert_eq!(stored.size, 8);
        assert_eq!(stored.template_engine, "golang");

        let listed = provider.list_info("inv").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "invoice");
    }

    #[tokio::test]
    async fn rename_removes_previous_object() {
        let provider = BundleProvider::new(Some(Arc::new(InMemoryStore::new())));
        provider
            .save(&BundleInfo::new("draft", "golang", Bytes::from_static(b"v1")))
            .await
            .expect("save draft");

        let mut renamed = BundleInfo::new("final", "golang", Bytes::from_static(b"v2"));
        renamed.rename_from = Some("draft".to_string());
        provider.save(&renamed).await.expect("save renamed");

        assert!(matches!(
            provider.get("draft").await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(
            provider.get("final").await.expect("renamed").data,
            Bytes::from_static(b"v2")
        );
    }
}
