//! # Sync Sinks
//!
//! Where completed passes deliver their result. Writing the result into the
//! cluster's native secret store is the sink's concern, not the scheduler's.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::crd::{ObjectKey, SecretData};
use crate::error::SyncError;

/// Receives the outcome of every completed pass
///
/// Passes held back by the flood gate are not completed and are not delivered.
#[async_trait]
pub trait SyncSink: Send + Sync {
    async fn deliver(&self, object: &ObjectKey, result: Result<SecretData, SyncError>);
}

/// Logs outcomes without storing them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl SyncSink for LogSink {
    async fn deliver(&self, object: &ObjectKey, result: Result<SecretData, SyncError>) {
        match result {
            Ok(data) => info!(
                object = %object,
                keys = data.len(),
                "Sync result ready: {:?}",
                data.keys().collect::<Vec<_>>()
            ),
            Err(e) => warn!(object = %object, kind = e.kind().as_str(), "Sync failed: {}", e),
        }
    }
}

/// Forwards outcomes to a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<(ObjectKey, Result<SecretData, SyncError>)>,
}

impl ChannelSink {
    /// Sink and the receiving end of its channel
    #[must_use]
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<(ObjectKey, Result<SecretData, SyncError>)>,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl SyncSink for ChannelSink {
    async fn deliver(&self, object: &ObjectKey, result: Result<SecretData, SyncError>) {
        if self.sender.send((object.clone(), result)).is_err() {
            warn!(object = %object, "Sync result dropped: receiver closed");
        }
    }
}
