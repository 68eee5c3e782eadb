//! # Store Validator
//!
//! Periodically probes every store and records the result in the health
//! cache the flood gate reads. A store turning `Ready` re-runs every object
//! that depends on it.
//!
//! A round runs at startup, every `interval`, and whenever the store catalog
//! changes.

use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{
    CLIENT_CLOSE_TIMEOUT_SECS, VALIDATION_CONCURRENCY, VALIDATION_FALLBACK_NAMESPACE,
    VALIDATION_TIMEOUT_SECS,
};
use crate::controller::catalog::StoreCatalog;
use crate::controller::health::HealthCache;
use crate::controller::scheduler::SchedulerHandle;
use crate::crd::SecretStore;
use crate::error::SyncError;
use crate::observability::metrics;
use crate::provider::{CredentialResolver, ProviderRegistry, ValidationResult};

pub struct StoreValidator {
    catalog: Arc<StoreCatalog>,
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn CredentialResolver>,
    health: Arc<HealthCache>,
    scheduler: SchedulerHandle,
    interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for StoreValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreValidator")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StoreValidator {
    #[must_use]
    pub fn new(
        catalog: Arc<StoreCatalog>,
        registry: Arc<ProviderRegistry>,
        resolver: Arc<dyn CredentialResolver>,
        health: Arc<HealthCache>,
        scheduler: SchedulerHandle,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            registry,
            resolver,
            health,
            scheduler,
            interval,
            timeout: Duration::from_secs(VALIDATION_TIMEOUT_SECS),
        }
    }

    /// Deadline of one store's validation, including client construction
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(interval = ?self.interval, "Store validator started");
        loop {
            self.validate_all().await;
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = self.catalog.changed() => debug!("Store catalog changed"),
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Store validator stopped");
    }

    /// Validate every store once; returns how many were checked
    pub async fn validate_all(&self) -> usize {
        let stores = self.catalog.all();
        let count = stores.len();
        futures::stream::iter(stores)
            .map(|store| async move {
                let key = store.key();
                let (result, message) = match self.validate(&store).await {
                    Ok(ValidationResult::Ready) => (ValidationResult::Ready, None),
                    Ok(other) => (other, None),
                    Err(e) => (ValidationResult::Error, Some(e.to_string())),
                };
                metrics::increment_store_validations(result.as_str());
                match &message {
                    Some(message) => warn!(store = %key, "Store validation failed: {}", message),
                    None => debug!(store = %key, result = result.as_str(), "Store validated"),
                }
                // Only the configuration that was validated may be recorded. A store
                // removed or edited mid-round keeps its forgotten health.
                if !self.is_current(&store) {
                    debug!(store = %key, "Store changed during validation, result discarded");
                    return;
                }
                let recovered = self.health.record(&key, result, message);
                if !self.is_current(&store) {
                    self.health.forget(&key);
                    return;
                }
                if recovered {
                    if let Err(e) = self.scheduler.health_recovered(key.clone()) {
                        warn!(store = %key, "Failed to report recovery: {}", e);
                    }
                }
            })
            .buffer_unordered(VALIDATION_CONCURRENCY)
            .collect::<()>()
            .await;
        count
    }

    /// Whether the catalog still holds exactly this store
    fn is_current(&self, store: &Arc<SecretStore>) -> bool {
        self.catalog
            .get(&store.key())
            .is_some_and(|current| Arc::ptr_eq(&current, store))
    }

    async fn validate(&self, store: &SecretStore) -> Result<ValidationResult, SyncError> {
        let provider = self.registry.for_config(&store.provider).ok_or_else(|| {
            SyncError::Configuration(format!(
                "no provider registered for type {}",
                store.provider.tag()
            ))
        })?;
        provider.validate_config(store)?;

        let namespace = store
            .namespace
            .as_deref()
            .unwrap_or(VALIDATION_FALLBACK_NAMESPACE);
        let client = tokio::time::timeout(
            self.timeout,
            provider.new_client(store, self.resolver.as_ref(), namespace),
        )
        .await
        .map_err(|_| SyncError::Timeout(self.timeout))??;
        let result = tokio::time::timeout(self.timeout, client.validate())
            .await
            .map_err(|_| SyncError::Timeout(self.timeout))
            .and_then(|result| result);
        let close_deadline = Duration::from_secs(CLIENT_CLOSE_TIMEOUT_SECS);
        match tokio::time::timeout(close_deadline, client.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(store = %store.key(), "Failed to close validation client: {}", e),
            Err(_) => debug!(store = %store.key(), "Validation client close timed out"),
        }
        result
    }
}
