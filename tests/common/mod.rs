//! Common test utilities for scheduler integration tests
//!
//! Provides a running scheduler wired to an in-memory backend, plus builders
//! for stores and sync objects.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use secret_sync_controller::controller::catalog::StoreCatalog;
use secret_sync_controller::controller::health::HealthCache;
use secret_sync_controller::prelude::*;
use secret_sync_controller::provider::resolver::StaticCredentialResolver;

pub const NAMESPACE: &str = "payments";

/// Result delivered by a pass
pub type Delivery = (ObjectKey, Result<SecretData, SyncError>);

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent: 4,
        requeue_interval: Duration::from_secs(300),
        backoff_start: Duration::from_secs(1),
        backoff_max: Duration::from_secs(8),
        probe_interval: Duration::from_secs(5),
        pass_timeout: Duration::from_secs(10),
        flood_gate: true,
    }
}

/// A running scheduler and its collaborators
pub struct Harness {
    pub provider: Arc<MemoryProvider>,
    pub registry: Arc<ProviderRegistry>,
    pub health: Arc<HealthCache>,
    pub catalog: Arc<StoreCatalog>,
    pub handle: SchedulerHandle,
    pub results: mpsc::UnboundedReceiver<Delivery>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Harness {
    pub fn start(config: SchedulerConfig) -> Self {
        let provider = Arc::new(MemoryProvider::default());
        let mut registry = ProviderRegistry::new();
        registry
            .register(
                "memory",
                Arc::clone(&provider) as Arc<dyn Provider>,
                MaintenanceStatus::Maintained,
            )
            .unwrap();
        let registry = Arc::new(registry);
        let health = Arc::new(HealthCache::new(Duration::from_secs(3600)));
        let catalog = Arc::new(StoreCatalog::default());
        let (sink, results) = ChannelSink::channel();
        let (scheduler, handle) = Scheduler::new(
            config,
            Arc::clone(&registry),
            Arc::new(StaticCredentialResolver::new()),
            Arc::new(sink),
            Arc::clone(&health),
            Arc::clone(&catalog),
        );
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(scheduler.run(async move {
            let _ = stopped.await;
        }));
        Self {
            provider,
            registry,
            health,
            catalog,
            handle,
            results,
            stop,
            task,
        }
    }

    pub fn vault(&self, name: &str) -> Arc<MemoryVault> {
        self.provider.vault(name)
    }

    /// Wait until every command sent so far has been handled
    pub async fn sync_commands(&self) {
        self.handle.statuses().await.unwrap();
    }

    /// Add a store and wait until the scheduler has seen it
    pub async fn add_store(&self, store: SecretStore) {
        self.handle.upsert_store(store).unwrap();
        self.sync_commands().await;
    }

    /// Add a store and record it healthy
    pub async fn add_ready_store(&self, store: SecretStore) {
        let key = store.key();
        self.add_store(store).await;
        self.health
            .record(&key, ValidationResult::Ready, None);
    }

    pub async fn next_result(&mut self) -> Delivery {
        tokio::time::timeout(Duration::from_secs(3600), self.results.recv())
            .await
            .expect("no pass completed in time")
            .expect("sink channel closed")
    }

    /// Results delivered without waiting
    pub fn drain_results(&mut self) -> Vec<Delivery> {
        let mut drained = Vec::new();
        while let Ok(result) = self.results.try_recv() {
            drained.push(result);
        }
        drained
    }

    pub async fn status(&self, key: &ObjectKey) -> Option<SyncStatus> {
        self.handle.status(key.clone()).await.unwrap()
    }

    /// Poll until the object's status satisfies `condition`
    pub async fn wait_for_status(
        &self,
        key: &ObjectKey,
        what: &str,
        condition: impl Fn(&SyncStatus) -> bool,
    ) -> SyncStatus {
        for _ in 0..1000 {
            if let Some(status) = self.status(key).await {
                if condition(&status) {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{key} never reached {what}");
    }

    /// Poll until the scheduler no longer knows `key`
    pub async fn wait_for_removal(&self, key: &ObjectKey) {
        for _ in 0..1000 {
            if self.status(key).await.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{key} was never removed");
    }

    /// Poll until `condition` holds
    pub async fn wait_until(&self, what: &str, condition: impl Fn() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap();
    }
}

pub fn memory_store(name: &str, vault: &str, capabilities: Capabilities) -> SecretStore {
    SecretStore {
        name: name.to_string(),
        namespace: Some(NAMESPACE.to_string()),
        provider: ProviderConfig::Memory(MemoryConfig {
            vault: vault.to_string(),
            capabilities,
        }),
    }
}

pub fn store_ref(name: &str) -> StoreRef {
    StoreRef {
        name: name.to_string(),
        kind: StoreKind::SecretStore,
    }
}

/// Object reading `(secret_key, remote_key)` pairs from `store`
pub fn pull_object(name: &str, store: &str, keys: &[(&str, &str)]) -> SyncObject {
    SyncObject {
        namespace: NAMESPACE.to_string(),
        name: name.to_string(),
        refresh_interval_secs: None,
        data: keys
            .iter()
            .map(|(secret_key, remote_key)| DataRequest::Secret {
                store: store_ref(store),
                secret_key: (*secret_key).to_string(),
                remote_ref: RemoteRef::new(*remote_key),
            })
            .collect(),
        push: Vec::new(),
        source_data: SecretData::new(),
        deletion_policy: DeletionPolicy::Retain,
    }
}

/// Object pushing its `token` source key to each remote key in `store`
pub fn push_object(
    name: &str,
    store: &str,
    remote_keys: &[&str],
    policy: DeletionPolicy,
) -> SyncObject {
    SyncObject {
        namespace: NAMESPACE.to_string(),
        name: name.to_string(),
        refresh_interval_secs: None,
        data: Vec::new(),
        push: remote_keys
            .iter()
            .map(|remote_key| PushRequest {
                store: store_ref(store),
                spec: PushSpec {
                    source_key: Some("token".to_string()),
                    remote_key: (*remote_key).to_string(),
                    property: None,
                },
            })
            .collect(),
        source_data: SecretData::from([("token".to_string(), b"s3cr3t".to_vec())]),
        deletion_policy: policy,
    }
}
