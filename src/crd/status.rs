//! # Sync Status
//!
//! Status recorded per sync object by the scheduler.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Phase of a sync object
///
/// `Pending -> Syncing -> Synced | Failed -> Pending`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum SyncPhase {
    #[default]
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl SyncPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Pending => "Pending",
            SyncPhase::Syncing => "Syncing",
            SyncPhase::Synced => "Synced",
            SyncPhase::Failed => "Failed",
        }
    }
}

/// Status of a sync object
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Human-readable description of the current state
    #[serde(default)]
    pub description: Option<String>,
    /// Last error message (cleared by a successful pass)
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_kind: Option<ErrorKind>,
    /// Failed passes since the last success
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Last successful pass (RFC3339)
    #[serde(default)]
    pub last_sync_time: Option<String>,
    /// Next scheduled pass (RFC3339)
    #[serde(default)]
    pub next_reconcile_time: Option<String>,
    /// Number of keys delivered by the last successful pass
    #[serde(default)]
    pub secrets_synced: Option<usize>,
}
