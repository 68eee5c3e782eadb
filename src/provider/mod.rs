//! # Provider Modules
//!
//! The contract every backend implements, and the backends themselves.
//!
//! A backend contributes two pieces:
//! - a [`Provider`], registered once at bootstrap, that validates store
//!   configuration and builds clients
//! - a [`SecretsClient`], built fresh for each reconcile pass, that talks to
//!   the backend on behalf of exactly one store
//!
//! Shared semantics (version tokens, JSON flattening, name filters, push
//! value extraction) live in [`extract`] and [`find`] so that every backend
//! behaves the same way regardless of its native API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crd::{FindQuery, PushSpec, RemoteRef, SecretData, SecretStore};
use crate::error::Result;

pub mod common;
pub mod extract;
pub mod find;
pub mod memory;
pub mod registry;
pub mod resolver;
pub mod sakura;

pub use registry::{ProviderRegistry, RegisteredProvider};
pub use resolver::CredentialResolver;

/// Operations a backend accepts
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum Capabilities {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Capabilities {
    #[must_use]
    pub fn can_read(self) -> bool {
        matches!(self, Capabilities::ReadOnly | Capabilities::ReadWrite)
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Capabilities::WriteOnly | Capabilities::ReadWrite)
    }
}

/// Outcome of a store health check
///
/// `Unknown` means "never checked" and is distinct from a healthy result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationResult {
    #[default]
    Unknown,
    Ready,
    Error,
}

impl ValidationResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationResult::Unknown => "unknown",
            ValidationResult::Ready => "ready",
            ValidationResult::Error => "error",
        }
    }
}

/// Support level a backend is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaintenanceStatus {
    Maintained,
    NotMaintained,
}

/// Per-backend factory
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Operations clients of this backend accept
    fn capabilities(&self) -> Capabilities;

    /// Operations clients built for `store` accept
    ///
    /// Defaults to the provider-wide [`Provider::capabilities`].
    fn store_capabilities(&self, _store: &SecretStore) -> Capabilities {
        self.capabilities()
    }

    /// Structural check of a store's configuration
    ///
    /// Pure: no network I/O. Returns warnings on success.
    ///
    /// # Errors
    /// `Configuration` when a required field is missing, the variant does not
    /// belong to this provider, or a credential reference leaves the store's
    /// namespace.
    fn validate_config(&self, store: &SecretStore) -> Result<Vec<String>>;

    /// Resolve credentials and build an authenticated client for `store`
    ///
    /// `namespace` is the namespace of the object the client is built for.
    ///
    /// # Errors
    /// `Configuration`, `CredentialResolution` or `BackendConnect`.
    async fn new_client(
        &self,
        store: &SecretStore,
        resolver: &dyn CredentialResolver,
        namespace: &str,
    ) -> Result<Box<dyn SecretsClient>>;
}

/// Normalized operations on one backend store
#[async_trait]
pub trait SecretsClient: Send + Sync + std::fmt::Debug {
    /// Raw value of a single secret
    async fn get_secret(&self, remote_ref: &RemoteRef) -> Result<Vec<u8>>;

    /// A JSON object secret, flattened to its top-level keys
    async fn get_secret_map(&self, remote_ref: &RemoteRef) -> Result<SecretData>;

    /// Every secret matching `query`, keyed by name
    async fn get_all_secrets(&self, query: &FindQuery) -> Result<SecretData>;

    /// Idempotent create-or-update of `spec.remote_key`
    async fn push_secret(&self, spec: &PushSpec, source: &SecretData) -> Result<()>;

    /// Delete a secret; a missing secret is not an error
    async fn delete_secret(&self, remote_key: &str) -> Result<()>;

    async fn secret_exists(&self, remote_key: &str) -> Result<bool>;

    /// Read-only round-trip proving reachability and valid credentials
    ///
    /// Returns `Ready` on success. A failure is returned as the error that
    /// caused it and maps to `ValidationResult::Error`.
    async fn validate(&self) -> Result<ValidationResult>;

    /// Release the session. Called exactly once per client.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(Capabilities::ReadOnly.can_read());
        assert!(!Capabilities::ReadOnly.can_write());
        assert!(!Capabilities::WriteOnly.can_read());
        assert!(Capabilities::WriteOnly.can_write());
        assert!(Capabilities::ReadWrite.can_read() && Capabilities::ReadWrite.can_write());
    }

    #[test]
    fn test_validation_result_defaults_to_unknown() {
        assert_eq!(ValidationResult::default(), ValidationResult::Unknown);
    }
}
