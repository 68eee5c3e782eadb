//! # Errors
//!
//! Error taxonomy shared by providers, clients and the scheduler.
//!
//! Every contract operation returns the most specific [`SyncError`] it can.
//! The scheduler only looks at [`ErrorKind`] to decide whether a failed pass
//! is retried with backoff or parked until its input changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a [`SyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub enum ErrorKind {
    Configuration,
    CredentialResolution,
    BackendConnect,
    Backend,
    SecretNotFound,
    InvalidVersion,
    InvalidPattern,
    MalformedPayload,
    SourceKeyNotFound,
    UnsupportedOperation,
    Timeout,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed on an unchanged input
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::CredentialResolution
                | ErrorKind::BackendConnect
                | ErrorKind::Backend
                | ErrorKind::SecretNotFound
                | ErrorKind::Timeout
        )
    }

    /// Label used in metrics and status
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::CredentialResolution => "CredentialResolutionError",
            ErrorKind::BackendConnect => "BackendConnectError",
            ErrorKind::Backend => "BackendError",
            ErrorKind::SecretNotFound => "SecretNotFoundError",
            ErrorKind::InvalidVersion => "InvalidVersionError",
            ErrorKind::InvalidPattern => "InvalidPatternError",
            ErrorKind::MalformedPayload => "MalformedPayloadError",
            ErrorKind::SourceKeyNotFound => "SourceKeyNotFoundError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperationError",
            ErrorKind::Timeout => "Timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to resolve credential {reference}: {message}")]
    CredentialResolution { reference: String, message: String },

    #[error("failed to connect to backend: {0}")]
    BackendConnect(String),

    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("secret {key} not found")]
    SecretNotFound { key: String },

    #[error("invalid version {version:?}: {message}")]
    InvalidVersion { version: String, message: String },

    #[error("invalid name pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("secret {key} is not a JSON object: {message}")]
    MalformedPayload { key: String, message: String },

    #[error("source key {key} not found in source data")]
    SourceKeyNotFound { key: String },

    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("reconcile pass exceeded its deadline of {0:?}")]
    Timeout(std::time::Duration),
}

impl SyncError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Configuration(_) => ErrorKind::Configuration,
            SyncError::CredentialResolution { .. } => ErrorKind::CredentialResolution,
            SyncError::BackendConnect(_) => ErrorKind::BackendConnect,
            SyncError::Backend(_) => ErrorKind::Backend,
            SyncError::SecretNotFound { .. } => ErrorKind::SecretNotFound,
            SyncError::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            SyncError::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            SyncError::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            SyncError::SourceKeyNotFound { .. } => ErrorKind::SourceKeyNotFound,
            SyncError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            SyncError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
