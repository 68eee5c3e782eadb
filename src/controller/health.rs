//! # Store Health
//!
//! Last validation result per store, with a time-to-live.
//!
//! Entries older than the TTL read as `Unknown`. Writers race freely; the
//! last write wins.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::crd::StoreKey;
use crate::provider::ValidationResult;

#[derive(Debug, Clone)]
struct HealthEntry {
    result: ValidationResult,
    checked_at: Instant,
    message: Option<String>,
}

/// Health of one store as seen by the flood gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHealth {
    pub result: ValidationResult,
    /// Cause of the last `Error`
    pub message: Option<String>,
}

/// Shared health cache
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    entries: RwLock<HashMap<StoreKey, HealthEntry>>,
}

impl HealthCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn fresh(&self, entry: &HealthEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.checked_at) < self.ttl
    }

    /// Current health of `store`
    #[must_use]
    pub fn get(&self, store: &StoreKey) -> StoreHealth {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(store)
            .filter(|entry| self.fresh(entry, now))
            .map_or(
                StoreHealth {
                    result: ValidationResult::Unknown,
                    message: None,
                },
                |entry| StoreHealth {
                    result: entry.result,
                    message: entry.message.clone(),
                },
            )
    }

    /// Record a validation result
    ///
    /// Returns `true` when the store becomes `Ready` after having been in any
    /// other state (including expired or never checked).
    pub fn record(
        &self,
        store: &StoreKey,
        result: ValidationResult,
        message: Option<String>,
    ) -> bool {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = entries
            .get(store)
            .filter(|entry| self.fresh(entry, now))
            .map_or(ValidationResult::Unknown, |entry| entry.result);
        entries.insert(
            store.clone(),
            HealthEntry {
                result,
                checked_at: now,
                message,
            },
        );
        result == ValidationResult::Ready && previous != ValidationResult::Ready
    }

    /// Forget `store`; it reads as `Unknown` until validated again
    pub fn forget(&self, store: &StoreKey) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(store);
    }

    /// First store in `stores` that is not known healthy
    #[must_use]
    pub fn first_unhealthy<'a>(
        &self,
        stores: impl IntoIterator<Item = &'a StoreKey>,
    ) -> Option<(StoreKey, StoreHealth)> {
        stores.into_iter().find_map(|store| {
            let health = self.get(store);
            (health.result != ValidationResult::Ready).then(|| (store.clone(), health))
        })
    }
}
