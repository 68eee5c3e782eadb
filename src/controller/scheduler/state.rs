//! Per-object scheduling state
//!
//! `Pending -> Syncing -> Synced | Failed -> Pending`. The scheduler actor is
//! the only writer.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::controller::backoff::ExponentialBackoff;
use crate::crd::{DeletionPolicy, StoreKey, SyncObject, SyncPhase, SyncStatus};
use crate::error::SyncError;

/// Remote key pushed by an object
pub(crate) type PushedKey = (StoreKey, String);

#[derive(Debug)]
pub(crate) struct ObjectState {
    pub(crate) object: Arc<SyncObject>,
    pub(crate) status: SyncStatus,
    pub(crate) backoff: ExponentialBackoff,
    /// A pass is queued or running
    pub(crate) in_flight: bool,
    /// A trigger arrived while in flight; run once more afterwards
    pub(crate) recheck: bool,
    /// Failed permanently; waits for a change or an explicit trigger
    pub(crate) parked: bool,
    /// Removed while in flight; dropped when the pass completes
    pub(crate) removed: bool,
    /// Only deletes remain: the object is gone but its pushes must be cleaned up
    pub(crate) tombstone: bool,
    /// Remote keys to delete on the next pass
    pub(crate) pending_deletes: BTreeSet<PushedKey>,
}

impl ObjectState {
    pub(crate) fn new(object: SyncObject, backoff: ExponentialBackoff) -> Self {
        Self {
            object: Arc::new(object),
            status: SyncStatus::default(),
            backoff,
            in_flight: false,
            recheck: false,
            parked: false,
            removed: false,
            tombstone: false,
            pending_deletes: BTreeSet::new(),
        }
    }

    /// Replace the object definition
    ///
    /// Returns `false` when nothing changed. Keys the new definition stops
    /// pushing are queued for deletion under the `Delete` policy.
    pub(crate) fn update(&mut self, object: SyncObject) -> bool {
        if *self.object == object {
            return false;
        }
        if object.deletion_policy == DeletionPolicy::Delete {
            let kept = object.pushed_keys();
            self.pending_deletes.extend(
                self.object
                    .pushed_keys()
                    .into_iter()
                    .filter(|key| !kept.contains(key)),
            );
        }
        // A key pushed again must not be deleted afterwards.
        for key in object.pushed_keys() {
            self.pending_deletes.remove(&key);
        }
        self.object = Arc::new(object);
        self.parked = false;
        self.removed = false;
        self.tombstone = false;
        true
    }

    /// Turn the state into a cleanup-only tombstone
    ///
    /// Returns `false` when nothing needs cleaning up and the state can be
    /// dropped right away.
    pub(crate) fn retire(&mut self) -> bool {
        if self.object.deletion_policy != DeletionPolicy::Delete {
            return false;
        }
        self.pending_deletes.extend(self.object.pushed_keys());
        if self.pending_deletes.is_empty() {
            return false;
        }
        let mut remnant = (*self.object).clone();
        remnant.data.clear();
        remnant.push.clear();
        self.object = Arc::new(remnant);
        self.tombstone = true;
        self.parked = false;
        true
    }

    pub(crate) fn mark_pending(&mut self, description: impl Into<String>) {
        self.status.phase = SyncPhase::Pending;
        self.status.description = Some(description.into());
    }

    pub(crate) fn mark_syncing(&mut self) {
        self.status.phase = SyncPhase::Syncing;
        self.status.description = Some("Reconcile pass in progress".to_string());
    }

    pub(crate) fn mark_synced(&mut self, keys: usize, deleted: &BTreeSet<PushedKey>) {
        self.backoff.reset();
        self.parked = false;
        for key in deleted {
            self.pending_deletes.remove(key);
        }
        self.status.phase = SyncPhase::Synced;
        self.status.description = Some(format!("Synced {keys} keys"));
        self.status.last_error = None;
        self.status.last_error_kind = None;
        self.status.consecutive_failures = 0;
        self.status.last_sync_time = Some(Utc::now().to_rfc3339());
        self.status.secrets_synced = Some(keys);
    }

    /// Record a failure; returns the retry delay for retryable errors
    pub(crate) fn mark_failed(&mut self, error: &SyncError) -> Option<Duration> {
        self.status.phase = SyncPhase::Failed;
        self.status.description = Some(format!("Reconcile failed: {}", error.kind().as_str()));
        self.status.last_error = Some(error.to_string());
        self.status.last_error_kind = Some(error.kind());
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        if error.is_retryable() {
            Some(self.backoff.next_backoff())
        } else {
            self.parked = true;
            None
        }
    }

    pub(crate) fn set_next_reconcile(&mut self, delay: Option<Duration>) {
        self.status.next_reconcile_time = delay.and_then(|delay| {
            chrono::Duration::from_std(delay)
                .ok()
                .map(|delay| (Utc::now() + delay).to_rfc3339())
        });
    }
}
