//! # Reconciliation Scheduler
//!
//! Single actor owning the state of every sync object. Handles send it
//! commands; it keeps one timer per object and dispatches due objects into a
//! bounded pool of reconcile passes.
//!
//! ## Guarantees
//!
//! - At most one pass per object at a time. Triggers that arrive while a pass
//!   runs collapse into a single re-check after it completes.
//! - At most `max_concurrent` passes run process-wide. Waiting passes are
//!   admitted in the order they became due.
//! - With the flood gate enabled, no backend call is made for an object while
//!   any store it depends on is not known healthy. Held objects stay
//!   `Pending` and are probed again after `probe_interval`.
//! - Retryable failures back off exponentially up to `backoff_max`. Permanent
//!   failures wait for a changed object, a changed store or an explicit
//!   trigger.

mod pass;
mod queue;
mod state;

pub use queue::TriggerSource;

use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::catalog::StoreCatalog;
use crate::controller::health::HealthCache;
use crate::controller::sink::SyncSink;
use crate::crd::{ObjectKey, SecretStore, StoreKey, SyncObject, SyncStatus};
use crate::error::SyncError;
use crate::observability::metrics;
use crate::provider::{CredentialResolver, ProviderRegistry};
use pass::{PassContext, PassOutcome, PassPlan};
use queue::TimerQueue;
use state::ObjectState;

/// Wake-up interval when no timer is pending
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Passes allowed to run at once
    pub max_concurrent: usize,
    /// Delay between successful passes unless the object sets its own
    pub requeue_interval: Duration,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    /// Retry delay while the flood gate holds an object
    pub probe_interval: Duration,
    /// Deadline of a single pass
    pub pass_timeout: Duration,
    pub flood_gate: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        crate::config::ControllerConfig::default().scheduler_config()
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    Closed,
}

#[derive(Debug)]
enum Command {
    UpsertStore(SecretStore),
    RemoveStore(StoreKey),
    UpsertObject(Box<SyncObject>),
    RemoveObject(ObjectKey),
    Trigger(ObjectKey, oneshot::Sender<bool>),
    HealthRecovered(StoreKey),
    Status(ObjectKey, oneshot::Sender<Option<SyncStatus>>),
    Statuses(oneshot::Sender<BTreeMap<ObjectKey, SyncStatus>>),
}

/// Cloneable front end of a running [`Scheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.commands
            .send(command)
            .map_err(|_| SchedulerError::Closed)
    }

    /// Add or replace a store; dependents re-run if it changed
    pub fn upsert_store(&self, store: SecretStore) -> Result<(), SchedulerError> {
        self.send(Command::UpsertStore(store))
    }

    pub fn remove_store(&self, store: StoreKey) -> Result<(), SchedulerError> {
        self.send(Command::RemoveStore(store))
    }

    /// Add or replace an object; a new or changed object runs immediately
    pub fn upsert_object(&self, object: SyncObject) -> Result<(), SchedulerError> {
        self.send(Command::UpsertObject(Box::new(object)))
    }

    /// Stop reconciling an object
    ///
    /// Under the `Delete` policy its pushed keys are deleted first.
    pub fn remove_object(&self, object: ObjectKey) -> Result<(), SchedulerError> {
        self.send(Command::RemoveObject(object))
    }

    /// Run an object now; returns `false` for an unknown object
    pub async fn trigger(&self, object: ObjectKey) -> Result<bool, SchedulerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Trigger(object, reply))?;
        response.await.map_err(|_| SchedulerError::Closed)
    }

    /// Re-run every object depending on a store that became healthy
    pub fn health_recovered(&self, store: StoreKey) -> Result<(), SchedulerError> {
        self.send(Command::HealthRecovered(store))
    }

    pub async fn status(&self, object: ObjectKey) -> Result<Option<SyncStatus>, SchedulerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Status(object, reply))?;
        response.await.map_err(|_| SchedulerError::Closed)
    }

    pub async fn statuses(&self) -> Result<BTreeMap<ObjectKey, SyncStatus>, SchedulerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Statuses(reply))?;
        response.await.map_err(|_| SchedulerError::Closed)
    }
}

/// The scheduler actor; drive it with [`Scheduler::run`]
pub struct Scheduler {
    config: SchedulerConfig,
    ctx: Arc<PassContext>,
    catalog: Arc<StoreCatalog>,
    permits: Arc<Semaphore>,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    /// Passes that hold a permit and got past the flood gate
    started: mpsc::UnboundedReceiver<ObjectKey>,
    objects: HashMap<ObjectKey, ObjectState>,
    timers: TimerQueue,
    passes: JoinSet<(ObjectKey, PassOutcome)>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("objects", &self.objects.len())
            .field("timers", &self.timers.len())
            .field("passes", &self.passes.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<ProviderRegistry>,
        resolver: Arc<dyn CredentialResolver>,
        sink: Arc<dyn SyncSink>,
        health: Arc<HealthCache>,
        catalog: Arc<StoreCatalog>,
    ) -> (Self, SchedulerHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let (started_tx, started) = mpsc::unbounded_channel();
        let ctx = Arc::new(PassContext {
            registry,
            resolver,
            health,
            sink,
            started: started_tx,
            flood_gate: config.flood_gate,
            timeout: config.pass_timeout,
        });
        let scheduler = Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            ctx,
            catalog,
            commands,
            commands_open: true,
            started,
            objects: HashMap::new(),
            timers: TimerQueue::default(),
            passes: JoinSet::new(),
        };
        (scheduler, SchedulerHandle { commands: sender })
    }

    /// Run until `shutdown` resolves, then wait for running passes
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(
            max_concurrent = self.config.max_concurrent,
            flood_gate = self.config.flood_gate,
            "Scheduler started"
        );

        loop {
            let wake = self
                .timers
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_WAKE);
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("All scheduler handles dropped");
                        self.commands_open = false;
                    }
                },
                Some(key) = self.started.recv() => self.pass_started(&key),
                Some(joined) = self.passes.join_next(), if !self.passes.is_empty() => {
                    self.joined(joined);
                }
                () = tokio::time::sleep_until(wake) => {}
            }
            self.dispatch_due();
        }

        info!(running = self.passes.len(), "Scheduler stopping, waiting for running passes");
        while let Some(joined) = self.passes.join_next().await {
            self.joined(joined);
        }
        info!("Scheduler stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::UpsertStore(store) => {
                let key = store.key();
                if self.catalog.upsert(store) {
                    info!(store = %key, "Store updated");
                    self.ctx.health.forget(&key);
                    self.trigger_dependents(&key, TriggerSource::StoreChanged);
                }
            }
            Command::RemoveStore(key) => {
                if self.catalog.remove(&key) {
                    info!(store = %key, "Store removed");
                    self.ctx.health.forget(&key);
                    self.trigger_dependents(&key, TriggerSource::StoreChanged);
                }
            }
            Command::UpsertObject(object) => self.upsert_object(*object),
            Command::RemoveObject(key) => self.remove_object(&key),
            Command::Trigger(key, reply) => {
                let known = self.objects.get(&key).is_some_and(|s| !s.tombstone);
                if known {
                    self.kick(&key, TriggerSource::External);
                }
                let _ = reply.send(known);
            }
            Command::HealthRecovered(store) => {
                info!(store = %store, "Store healthy again");
                self.trigger_dependents(&store, TriggerSource::HealthRecovered);
            }
            Command::Status(key, reply) => {
                let _ = reply.send(self.objects.get(&key).map(|s| s.status.clone()));
            }
            Command::Statuses(reply) => {
                let _ = reply.send(
                    self.objects
                        .iter()
                        .filter(|(_, s)| !s.tombstone)
                        .map(|(key, s)| (key.clone(), s.status.clone()))
                        .collect(),
                );
            }
        }
    }

    fn upsert_object(&mut self, object: SyncObject) {
        let key = object.key();
        match self.objects.get_mut(&key) {
            Some(state) => {
                if !state.update(object) {
                    return;
                }
                info!(object = %key, "Object updated");
            }
            None => {
                info!(object = %key, "Object added");
                let backoff =
                    ExponentialBackoff::new(self.config.backoff_start, self.config.backoff_max);
                self.objects
                    .insert(key.clone(), ObjectState::new(object, backoff));
            }
        }
        self.kick(&key, TriggerSource::ObjectChanged);
    }

    fn remove_object(&mut self, key: &ObjectKey) {
        let Some(state) = self.objects.get_mut(key) else {
            return;
        };
        if state.in_flight {
            state.removed = true;
            self.timers.cancel(key);
        } else if state.retire() {
            info!(object = %key, pending = state.pending_deletes.len(), "Object removed, deleting pushed keys");
            self.schedule(key, Duration::ZERO, TriggerSource::ObjectChanged);
        } else {
            info!(object = %key, "Object removed");
            self.objects.remove(key);
            self.timers.cancel(key);
        }
    }

    /// Run `key` as soon as possible
    fn kick(&mut self, key: &ObjectKey, source: TriggerSource) {
        let Some(state) = self.objects.get_mut(key) else {
            return;
        };
        if state.in_flight {
            state.recheck = true;
            return;
        }
        state.parked = false;
        self.schedule(key, Duration::ZERO, source);
    }

    fn trigger_dependents(&mut self, store: &StoreKey, source: TriggerSource) {
        let dependents: Vec<ObjectKey> = self
            .objects
            .iter()
            .filter(|(_, state)| {
                // Health does not change the input of a permanently failed object.
                !(source == TriggerSource::HealthRecovered && state.parked)
            })
            .filter(|(_, state)| {
                state.object.store_keys().contains(store)
                    || state.pending_deletes.iter().any(|(s, _)| s == store)
            })
            .map(|(key, _)| key.clone())
            .collect();
        debug!(store = %store, count = dependents.len(), trigger = source.as_str(), "Triggering dependents");
        for key in dependents {
            self.kick(&key, source);
        }
    }

    fn schedule(&mut self, key: &ObjectKey, delay: Duration, source: TriggerSource) {
        self.timers.schedule(key.clone(), Instant::now() + delay, source);
        metrics::increment_requeues(source.as_str());
        if let Some(state) = self.objects.get_mut(key) {
            state.set_next_reconcile(Some(delay));
        }
    }

    fn dispatch_due(&mut self) {
        for (key, source) in self.timers.pop_due(Instant::now()) {
            self.dispatch(key, source);
        }
    }

    fn dispatch(&mut self, key: ObjectKey, source: TriggerSource) {
        let Some(state) = self.objects.get_mut(&key) else {
            return;
        };
        if state.in_flight {
            state.recheck = true;
            return;
        }
        // The phase turns Syncing only once the pass holds a permit and the
        // flood gate let it through.
        state.in_flight = true;
        state.set_next_reconcile(None);

        let stores = state
            .object
            .store_keys()
            .into_iter()
            .chain(state.pending_deletes.iter().map(|(store, _)| store.clone()))
            .map(|store| {
                let config = self.catalog.get(&store);
                (store, config)
            })
            .collect();
        let plan = PassPlan {
            object: Arc::clone(&state.object),
            stores,
            deletes: state.pending_deletes.clone(),
            deliver: !state.tombstone,
        };
        self.spawn_pass(key, source, plan);
    }

    fn pass_started(&mut self, key: &ObjectKey) {
        if let Some(state) = self.objects.get_mut(key).filter(|s| s.in_flight) {
            state.mark_syncing();
        }
    }

    fn spawn_pass(&mut self, key: ObjectKey, source: TriggerSource, plan: PassPlan) {
        let ctx = Arc::clone(&self.ctx);
        let permits = Arc::clone(&self.permits);
        let span = info_span!("reconcile", object = %key, trigger = source.as_str());
        self.passes.spawn(
            async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(permit) => {
                        let outcome = AssertUnwindSafe(ctx.execute(plan))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                PassOutcome::Failed(SyncError::Backend(
                                    "reconcile pass panicked".to_string(),
                                ))
                            });
                        drop(permit);
                        outcome
                    }
                    Err(_) => PassOutcome::Failed(SyncError::Backend(
                        "worker pool closed".to_string(),
                    )),
                };
                (key, outcome)
            }
            .instrument(span),
        );
        metrics::set_reconciliations_in_flight(self.passes.len());
    }

    fn joined(&mut self, joined: Result<(ObjectKey, PassOutcome), tokio::task::JoinError>) {
        metrics::set_reconciliations_in_flight(self.passes.len());
        match joined {
            Ok((key, outcome)) => self.complete(&key, outcome),
            Err(e) => warn!("Reconcile task did not complete: {}", e),
        }
    }

    fn complete(&mut self, key: &ObjectKey, outcome: PassOutcome) {
        let Some(state) = self.objects.get_mut(key) else {
            return;
        };
        state.in_flight = false;

        let next = match outcome {
            PassOutcome::Synced { keys, deleted } => {
                state.mark_synced(keys, &deleted);
                if state.tombstone && state.pending_deletes.is_empty() {
                    debug!(object = %key, "Pushed keys cleaned up");
                    self.objects.remove(key);
                    self.timers.cancel(key);
                    return;
                }
                let interval = state
                    .object
                    .refresh_interval_secs
                    .map_or(self.config.requeue_interval, Duration::from_secs);
                Some((interval, TriggerSource::TimerBased))
            }
            PassOutcome::Failed(error) => match state.mark_failed(&error) {
                Some(delay) => Some((delay, TriggerSource::ErrorBackoff)),
                None if state.tombstone => {
                    warn!(object = %key, "Abandoning cleanup of removed object: {}", error);
                    self.objects.remove(key);
                    self.timers.cancel(key);
                    return;
                }
                None => None,
            },
            PassOutcome::Held { store, health } => {
                let mut description = format!(
                    "Waiting for store {store} to become ready (currently {:?})",
                    health.result
                );
                if let Some(message) = health.message {
                    description.push_str(": ");
                    description.push_str(&message);
                }
                state.mark_pending(description);
                Some((self.config.probe_interval, TriggerSource::FloodGateProbe))
            }
        };

        if state.removed {
            state.removed = false;
            if state.retire() {
                self.schedule(key, Duration::ZERO, TriggerSource::ObjectChanged);
            } else {
                self.objects.remove(key);
                self.timers.cancel(key);
            }
            return;
        }

        let recheck = std::mem::take(&mut state.recheck);
        match (recheck, next) {
            (true, _) => self.schedule(key, Duration::ZERO, TriggerSource::Recheck),
            (false, Some((delay, source))) => self.schedule(key, delay, source),
            (false, None) => {
                state.set_next_reconcile(None);
                self.timers.cancel(key);
            }
        }
    }
}
