//! # In-Memory Provider
//!
//! Versioned in-process vaults. Stores naming the same vault share its
//! contents, so a vault behaves like one remote backend seen by many clients.
//!
//! Vaults can be made unavailable or slow, and count the calls they receive,
//! which makes them the reference backend for exercising the scheduler.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use super::common::{self, SecretComparison};
use super::{extract, find, Capabilities, CredentialResolver, Provider, SecretsClient, ValidationResult};
use crate::crd::{FindQuery, ProviderConfig, PushSpec, RemoteRef, SecretData, SecretStore};
use crate::error::{Result, SyncError};

const PROVIDER: &str = "memory";

#[derive(Debug, Default)]
struct StoredSecret {
    versions: Vec<Vec<u8>>,
    tags: BTreeMap<String, String>,
}

/// Call counters of a vault
#[derive(Debug, Default)]
struct Counters {
    gets: AtomicUsize,
    pushes: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    lists: AtomicUsize,
    validates: AtomicUsize,
    clients_opened: AtomicUsize,
    clients_closed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Snapshot of a vault's call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultStats {
    pub gets: usize,
    pub pushes: usize,
    /// Pushes that created a new version
    pub writes: usize,
    pub deletes: usize,
    pub lists: usize,
    pub validates: usize,
    pub clients_opened: usize,
    pub clients_closed: usize,
    /// Highest number of calls observed in flight at once
    pub max_in_flight: usize,
}

/// One named vault
#[derive(Debug)]
pub struct MemoryVault {
    name: String,
    secrets: RwLock<BTreeMap<String, StoredSecret>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
    counters: Counters,
}

/// Decrements the in-flight count when a call finishes
struct InFlight<'a>(&'a Counters);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryVault {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            secrets: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a new version of `key`
    pub fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.seed_with_tags(key, value, BTreeMap::new());
    }

    /// Store a new version of `key` and replace its tags
    pub fn seed_with_tags(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
        tags: BTreeMap<String, String>,
    ) {
        let mut secrets = self.write_secrets();
        let entry = secrets.entry(key.to_string()).or_default();
        entry.versions.push(value.into());
        entry.tags = tags;
    }

    /// Latest version of `key`
    #[must_use]
    pub fn latest(&self, key: &str) -> Option<Vec<u8>> {
        self.read_secrets()
            .get(key)
            .and_then(|s| s.versions.last().cloned())
    }

    #[must_use]
    pub fn version_count(&self, key: &str) -> usize {
        self.read_secrets().get(key).map_or(0, |s| s.versions.len())
    }

    /// Simulate an outage: every call fails with `BackendConnect`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stats(&self) -> VaultStats {
        let c = &self.counters;
        VaultStats {
            gets: c.gets.load(Ordering::SeqCst),
            pushes: c.pushes.load(Ordering::SeqCst),
            writes: c.writes.load(Ordering::SeqCst),
            deletes: c.deletes.load(Ordering::SeqCst),
            lists: c.lists.load(Ordering::SeqCst),
            validates: c.validates.load(Ordering::SeqCst),
            clients_opened: c.clients_opened.load(Ordering::SeqCst),
            clients_closed: c.clients_closed.load(Ordering::SeqCst),
            max_in_flight: c.max_in_flight.load(Ordering::SeqCst),
        }
    }

    fn read_secrets(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredSecret>> {
        self.secrets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_secrets(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredSecret>> {
        self.secrets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enter a call: count it, apply latency, fail when unavailable
    async fn begin(&self, counter: &AtomicUsize) -> Result<InFlight<'_>> {
        counter.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.counters);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(SyncError::BackendConnect(format!(
                "memory vault {} is unavailable",
                self.name
            )));
        }
        Ok(guard)
    }

    fn read_version(&self, key: &str, version: Option<u64>) -> Result<Vec<u8>> {
        let secrets = self.read_secrets();
        let stored = secrets.get(key).ok_or_else(|| SyncError::SecretNotFound {
            key: key.to_string(),
        })?;
        let value = match version {
            None => stored.versions.last(),
            Some(n) => usize::try_from(n)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| stored.versions.get(index)),
        };
        value.cloned().ok_or_else(|| SyncError::SecretNotFound {
            key: format!("{key}@{}", version.unwrap_or_default()),
        })
    }
}

/// Registry of named vaults shared by every client of the provider
#[derive(Debug, Default)]
pub struct MemoryProvider {
    vaults: RwLock<HashMap<String, Arc<MemoryVault>>>,
}

impl MemoryProvider {
    /// Vault named `name`, created on first use
    pub fn vault(&self, name: &str) -> Arc<MemoryVault> {
        if let Some(vault) = self
            .vaults
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(vault);
        }
        let mut vaults = self
            .vaults
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            vaults
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryVault::new(name))),
        )
    }
}

fn memory_config(store: &SecretStore) -> Result<&crate::crd::MemoryConfig> {
    match &store.provider {
        ProviderConfig::Memory(config) => Ok(config),
        other => Err(SyncError::Configuration(format!(
            "store {} has provider {:?}, expected memory",
            store.key(),
            other.tag()
        ))),
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ReadWrite
    }

    fn store_capabilities(&self, store: &SecretStore) -> Capabilities {
        memory_config(store).map_or(self.capabilities(), |config| config.capabilities)
    }

    fn validate_config(&self, store: &SecretStore) -> Result<Vec<String>> {
        let config = memory_config(store)?;
        if config.vault.is_empty() {
            return Err(SyncError::Configuration(format!(
                "store {}: memory.vault is required",
                store.key()
            )));
        }
        Ok(Vec::new())
    }

    async fn new_client(
        &self,
        store: &SecretStore,
        _resolver: &dyn CredentialResolver,
        _namespace: &str,
    ) -> Result<Box<dyn SecretsClient>> {
        self.validate_config(store)?;
        let config = memory_config(store)?;
        let vault = self.vault(&config.vault);
        vault.counters.clients_opened.fetch_add(1, Ordering::SeqCst);
        debug!(store = %store.key(), vault = config.vault.as_str(), "opened memory client");
        Ok(Box::new(MemoryClient {
            vault,
            capabilities: config.capabilities,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Client bound to one vault
#[derive(Debug)]
pub struct MemoryClient {
    vault: Arc<MemoryVault>,
    capabilities: Capabilities,
    closed: AtomicBool,
}

impl MemoryClient {
    fn require(&self, allowed: bool, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::BackendConnect(format!(
                "memory client for {} is closed",
                self.vault.name
            )));
        }
        if allowed {
            Ok(())
        } else {
            Err(SyncError::UnsupportedOperation(format!(
                "{operation} on {:?} vault {}",
                self.capabilities, self.vault.name
            )))
        }
    }
}

#[async_trait]
impl SecretsClient for MemoryClient {
    async fn get_secret(&self, remote_ref: &RemoteRef) -> Result<Vec<u8>> {
        let version = extract::parse_version(remote_ref.version())?;
        self.require(self.capabilities.can_read(), "get")?;
        let start = Instant::now();
        let _call = self.vault.begin(&self.vault.counters.gets).await?;
        let value = self.vault.read_version(&remote_ref.key, version)?;
        common::record_operation(PROVIDER, "get", start);
        match &remote_ref.property {
            Some(property) => extract::select_property(&remote_ref.key, &value, property),
            None => Ok(value),
        }
    }

    async fn get_secret_map(&self, remote_ref: &RemoteRef) -> Result<SecretData> {
        let unscoped = RemoteRef {
            property: None,
            ..remote_ref.clone()
        };
        let payload = self.get_secret(&unscoped).await?;
        extract::flatten_json_object(&remote_ref.key, &payload)
    }

    async fn get_all_secrets(&self, query: &FindQuery) -> Result<SecretData> {
        let matcher = find::compile_optional(query.name.as_deref())?;
        self.require(self.capabilities.can_read(), "find")?;
        let names: Vec<String> = {
            let _call = self.vault.begin(&self.vault.counters.lists).await?;
            self.vault
                .read_secrets()
                .iter()
                .filter(|(_, stored)| {
                    query.tags.as_ref().is_none_or(|tags| {
                        tags.iter().all(|(k, v)| stored.tags.get(k) == Some(v))
                    })
                })
                .map(|(name, _)| name.clone())
                .collect()
        };
        common::fetch_matching(names, matcher.as_ref(), |name| async move {
            let value = self.get_secret(&RemoteRef::new(name.clone())).await?;
            Ok((name, value))
        })
        .await
    }

    async fn push_secret(&self, spec: &PushSpec, source: &SecretData) -> Result<()> {
        let mut value = extract::push_value(spec, source)?;
        self.require(self.capabilities.can_write(), "push")?;
        let start = Instant::now();
        let _call = self.vault.begin(&self.vault.counters.pushes).await?;

        let current = self.vault.latest(&spec.remote_key);
        if let Some(property) = &spec.property {
            value = extract::merge_property(&spec.remote_key, current.as_deref(), property, &value)?;
        }
        let comparison =
            common::compare_secret_value(|| async { Ok(current.clone()) }, &value).await?;
        common::log_push_operation(PROVIDER, &spec.remote_key, comparison);
        if comparison != SecretComparison::Unchanged {
            self.vault.write_secrets()
                .entry(spec.remote_key.clone())
                .or_default()
                .versions
                .push(value);
            self.vault.counters.writes.fetch_add(1, Ordering::SeqCst);
        }
        common::record_operation(PROVIDER, "push", start);
        Ok(())
    }

    async fn delete_secret(&self, remote_key: &str) -> Result<()> {
        self.require(self.capabilities.can_write(), "delete")?;
        let _call = self.vault.begin(&self.vault.counters.deletes).await?;
        if self.vault.write_secrets().remove(remote_key).is_none() {
            debug!(vault = self.vault.name.as_str(), remote_key, "delete of missing secret ignored");
        }
        Ok(())
    }

    async fn secret_exists(&self, remote_key: &str) -> Result<bool> {
        self.require(true, "exists")?;
        let _call = self.vault.begin(&self.vault.counters.lists).await?;
        Ok(self.vault.read_secrets().contains_key(remote_key))
    }

    async fn validate(&self) -> Result<ValidationResult> {
        self.require(true, "validate")?;
        let _call = self.vault.begin(&self.vault.counters.validates).await?;
        Ok(ValidationResult::Ready)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.vault.counters.clients_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
