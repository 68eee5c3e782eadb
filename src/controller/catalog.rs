//! # Store Catalog
//!
//! Stores known to the controller, shared by the scheduler and the store
//! validator. Every change wakes the validator so a new or edited store is
//! probed without waiting for the next interval.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;

use crate::crd::{SecretStore, StoreKey};

#[derive(Debug, Default)]
pub struct StoreCatalog {
    stores: RwLock<BTreeMap<StoreKey, Arc<SecretStore>>>,
    changed: Notify,
}

impl StoreCatalog {
    /// Insert or replace a store
    ///
    /// Returns `false` when an identical store was already present.
    pub fn upsert(&self, store: SecretStore) -> bool {
        let key = store.key();
        let mut stores = self
            .stores
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if stores.get(&key).is_some_and(|current| **current == store) {
            return false;
        }
        stores.insert(key, Arc::new(store));
        drop(stores);
        self.changed.notify_one();
        true
    }

    pub fn remove(&self, key: &StoreKey) -> bool {
        let removed = self
            .stores
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.changed.notify_one();
        }
        removed
    }

    #[must_use]
    pub fn get(&self, key: &StoreKey) -> Option<Arc<SecretStore>> {
        self.stores
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Snapshot of every store
    #[must_use]
    pub fn all(&self) -> Vec<Arc<SecretStore>> {
        self.stores
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Wait for the next change
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
