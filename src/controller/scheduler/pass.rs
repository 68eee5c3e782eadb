//! One reconcile pass
//!
//! Order of a pass:
//! 1. resolve stores and providers, check configuration and capabilities
//! 2. flood gate: every store must be known healthy
//! 3. build one client per store, run pulls, pushes and deletes
//! 4. close every client, whether the pass finished, failed or timed out
//! 5. hand the result to the sink

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::PushedKey;
use crate::constants::CLIENT_CLOSE_TIMEOUT_SECS;
use crate::controller::health::{HealthCache, StoreHealth};
use crate::controller::sink::SyncSink;
use crate::crd::{DataRequest, ObjectKey, SecretData, SecretStore, StoreKey, SyncObject};
use crate::error::{Result, SyncError};
use crate::observability::metrics;
use crate::provider::{CredentialResolver, Provider, ProviderRegistry, SecretsClient};

/// Shared collaborators of every pass
pub(crate) struct PassContext {
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) resolver: Arc<dyn CredentialResolver>,
    pub(crate) health: Arc<HealthCache>,
    pub(crate) sink: Arc<dyn SyncSink>,
    /// Told when a pass starts calling backends
    pub(crate) started: mpsc::UnboundedSender<ObjectKey>,
    pub(crate) flood_gate: bool,
    pub(crate) timeout: Duration,
}

/// Inputs of one pass, captured when it is dispatched
#[derive(Debug)]
pub(crate) struct PassPlan {
    pub(crate) object: Arc<SyncObject>,
    pub(crate) stores: BTreeMap<StoreKey, Option<Arc<SecretStore>>>,
    pub(crate) deletes: BTreeSet<PushedKey>,
    /// Whether the result goes to the sink
    pub(crate) deliver: bool,
}

#[derive(Debug)]
pub(crate) enum PassOutcome {
    Synced {
        keys: usize,
        deleted: BTreeSet<PushedKey>,
    },
    Failed(SyncError),
    /// Flood gate held the pass back; nothing was called
    Held { store: StoreKey, health: StoreHealth },
}

struct Resolved {
    store: Arc<SecretStore>,
    provider: Arc<dyn Provider>,
}

/// Clients opened by a pass
///
/// Lives outside the pass's deadline so clients are closed even when the
/// pass is abandoned.
#[derive(Default)]
pub(crate) struct ClientSet {
    clients: Mutex<Vec<(StoreKey, Arc<dyn SecretsClient>)>>,
}

impl ClientSet {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(StoreKey, Arc<dyn SecretsClient>)>> {
        self.clients
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn get(&self, store: &StoreKey) -> Option<Arc<dyn SecretsClient>> {
        self.lock()
            .iter()
            .find(|(key, _)| key == store)
            .map(|(_, client)| Arc::clone(client))
    }

    fn insert(&self, store: StoreKey, client: Box<dyn SecretsClient>) -> Arc<dyn SecretsClient> {
        let client: Arc<dyn SecretsClient> = Arc::from(client);
        self.lock().push((store, Arc::clone(&client)));
        client
    }

    /// Close and forget every client; each is closed exactly once
    ///
    /// A close that does not finish within `CLIENT_CLOSE_TIMEOUT_SECS` is
    /// abandoned so it cannot pin the worker permit.
    pub(crate) async fn close_all(&self) {
        let clients = std::mem::take(&mut *self.lock());
        let deadline = Duration::from_secs(CLIENT_CLOSE_TIMEOUT_SECS);
        for (store, client) in clients {
            match tokio::time::timeout(deadline, client.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(store = %store, "Failed to close client: {}", e),
                Err(_) => warn!(store = %store, "Client close timed out after {:?}", deadline),
            }
        }
    }
}

impl PassContext {
    /// Run a pass and deliver its result
    pub(crate) async fn execute(&self, plan: PassPlan) -> PassOutcome {
        let key = plan.object.key();
        let resolved = match self.resolve(&plan) {
            Ok(resolved) => resolved,
            Err(e) => return self.finish(&key, &plan, Err(e), None).await,
        };

        if self.flood_gate {
            if let Some((store, health)) = self.health.first_unhealthy(resolved.keys()) {
                info!(
                    object = %key,
                    store = %store,
                    "Flood gate holding pass: store health is {:?}",
                    health.result
                );
                metrics::increment_flood_gate_holds();
                return PassOutcome::Held { store, health };
            }
        }

        // Only fails once the scheduler is gone.
        let _ = self.started.send(key.clone());
        metrics::increment_reconciliations();
        let start = Instant::now();
        let clients = ClientSet::default();
        let result = match tokio::time::timeout(self.timeout, self.sync(&plan, &resolved, &clients)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.timeout)),
        };
        clients.close_all().await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        self.finish(&key, &plan, result, Some(start)).await
    }

    async fn finish(
        &self,
        key: &ObjectKey,
        plan: &PassPlan,
        result: Result<(SecretData, BTreeSet<PushedKey>)>,
        started: Option<Instant>,
    ) -> PassOutcome {
        let elapsed = started.map(|s| s.elapsed()).unwrap_or_default();
        match result {
            Ok((data, deleted)) => {
                info!(object = %key, keys = data.len(), "Reconcile pass succeeded in {:?}", elapsed);
                let keys = data.len();
                if plan.deliver {
                    self.sink.deliver(key, Ok(data)).await;
                }
                PassOutcome::Synced { keys, deleted }
            }
            Err(e) => {
                warn!(object = %key, kind = e.kind().as_str(), "Reconcile pass failed: {}", e);
                metrics::increment_reconciliation_errors(e.kind().as_str());
                if plan.deliver {
                    self.sink.deliver(key, Err(e.clone())).await;
                }
                PassOutcome::Failed(e)
            }
        }
    }

    /// Pure checks: stores exist, providers are registered, configuration is
    /// valid and every store accepts the operations asked of it
    fn resolve(&self, plan: &PassPlan) -> Result<BTreeMap<StoreKey, Resolved>> {
        let object = &plan.object;
        let mut resolved = BTreeMap::new();
        for (key, store) in &plan.stores {
            let store = store
                .clone()
                .ok_or_else(|| SyncError::Configuration(format!("store {key} not found")))?;
            let provider = self.registry.for_config(&store.provider).ok_or_else(|| {
                SyncError::Configuration(format!(
                    "store {key}: no provider registered for type {}",
                    store.provider.tag()
                ))
            })?;
            for warning in provider.validate_config(&store)? {
                warn!(store = %key, "{}", warning);
            }
            resolved.insert(key.clone(), Resolved { store, provider });
        }

        let capabilities = |store: &StoreKey| {
            resolved
                .get(store)
                .map(|r| r.provider.store_capabilities(&r.store))
        };
        for request in &object.data {
            let store = request.store().resolve(&object.namespace);
            if capabilities(&store).is_some_and(|c| !c.can_read()) {
                return Err(SyncError::UnsupportedOperation(format!(
                    "store {store} does not allow reads"
                )));
            }
        }
        let written = object
            .push
            .iter()
            .map(|p| p.store.resolve(&object.namespace))
            .chain(plan.deletes.iter().map(|(store, _)| store.clone()));
        for store in written {
            if capabilities(&store).is_some_and(|c| !c.can_write()) {
                return Err(SyncError::UnsupportedOperation(format!(
                    "store {store} does not allow writes"
                )));
            }
        }
        Ok(resolved)
    }

    async fn client(
        &self,
        store: &StoreKey,
        resolved: &BTreeMap<StoreKey, Resolved>,
        namespace: &str,
        clients: &ClientSet,
    ) -> Result<Arc<dyn SecretsClient>> {
        if let Some(client) = clients.get(store) {
            return Ok(client);
        }
        let entry = resolved
            .get(store)
            .ok_or_else(|| SyncError::Configuration(format!("store {store} not found")))?;
        debug!(store = %store, "Building client");
        let client = entry
            .provider
            .new_client(&entry.store, self.resolver.as_ref(), namespace)
            .await?;
        Ok(clients.insert(store.clone(), client))
    }

    async fn sync(
        &self,
        plan: &PassPlan,
        resolved: &BTreeMap<StoreKey, Resolved>,
        clients: &ClientSet,
    ) -> Result<(SecretData, BTreeSet<PushedKey>)> {
        let object = &plan.object;
        let namespace = object.namespace.as_str();
        let mut data = SecretData::new();

        for request in &object.data {
            let store = request.store().resolve(namespace);
            let client = self.client(&store, resolved, namespace, clients).await?;
            match request {
                DataRequest::Secret {
                    secret_key,
                    remote_ref,
                    ..
                } => {
                    let value = client.get_secret(remote_ref).await?;
                    data.insert(secret_key.clone(), value);
                }
                DataRequest::Extract { remote_ref, .. } => {
                    data.extend(client.get_secret_map(remote_ref).await?);
                }
                DataRequest::Find { find, .. } => {
                    data.extend(client.get_all_secrets(find).await?);
                }
            }
        }

        for push in &object.push {
            let store = push.store.resolve(namespace);
            let client = self.client(&store, resolved, namespace, clients).await?;
            client.push_secret(&push.spec, &object.source_data).await?;
        }

        let mut deleted = BTreeSet::new();
        for (store, remote_key) in &plan.deletes {
            let client = self.client(store, resolved, namespace, clients).await?;
            client.delete_secret(remote_key).await?;
            info!(store = %store, remote_key = remote_key.as_str(), "Deleted remote key no longer pushed");
            deleted.insert((store.clone(), remote_key.clone()));
        }

        Ok((data, deleted))
    }
}
