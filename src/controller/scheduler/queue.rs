//! Timer queue keyed by object
//!
//! Each object has at most one pending wake-up. Rescheduling replaces it;
//! superseded heap entries are skipped when they surface.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::time::Instant;

use crate::crd::ObjectKey;

/// Why an object is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    /// Object created or changed
    ObjectChanged,
    /// A store the object uses was created or changed
    StoreChanged,
    /// Explicit trigger
    External,
    /// Refresh interval after a successful pass
    TimerBased,
    /// Backoff retry after a retryable failure
    ErrorBackoff,
    /// Flood gate probe while a store is not known healthy
    FloodGateProbe,
    /// A store the object uses became healthy
    HealthRecovered,
    /// Trigger that arrived while a pass was running
    Recheck,
}

impl TriggerSource {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::ObjectChanged => "object-changed",
            TriggerSource::StoreChanged => "store-changed",
            TriggerSource::External => "external",
            TriggerSource::TimerBased => "timer-based",
            TriggerSource::ErrorBackoff => "error-backoff",
            TriggerSource::FloodGateProbe => "flood-gate-probe",
            TriggerSource::HealthRecovered => "health-recovered",
            TriggerSource::Recheck => "recheck",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, ObjectKey)>>,
    pending: HashMap<ObjectKey, (Instant, u64, TriggerSource)>,
    seq: u64,
}

impl TimerQueue {
    /// Schedule `key` at `at`, replacing any earlier entry for it
    pub(crate) fn schedule(&mut self, key: ObjectKey, at: Instant, source: TriggerSource) {
        self.seq += 1;
        self.pending.insert(key.clone(), (at, self.seq, source));
        self.heap.push(Reverse((at, self.seq, key)));
    }

    pub(crate) fn cancel(&mut self, key: &ObjectKey) {
        self.pending.remove(key);
    }

    /// When `key` is due, if scheduled
    #[cfg(test)]
    pub(crate) fn due_at(&self, key: &ObjectKey) -> Option<Instant> {
        self.pending.get(key).map(|(at, _, _)| *at)
    }

    fn is_current(&self, seq: u64, key: &ObjectKey) -> bool {
        self.pending.get(key).is_some_and(|(_, s, _)| *s == seq)
    }

    /// Earliest live deadline
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, seq, key))) = self.heap.peek() {
            if self.is_current(*seq, key) {
                return Some(*at);
            }
            self.heap.pop();
        }
        None
    }

    /// Remove and return every entry due at `now`, earliest first
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<(ObjectKey, TriggerSource)> {
        let mut due = Vec::new();
        while let Some(Reverse((at, seq, key))) = self.heap.peek() {
            if *at > now {
                break;
            }
            let (seq, key) = (*seq, key.clone());
            self.heap.pop();
            if self.is_current(seq, &key) {
                if let Some((_, _, source)) = self.pending.remove(&key) {
                    due.push((key, source));
                }
            }
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
