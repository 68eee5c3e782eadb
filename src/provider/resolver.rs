//! # Credential Resolution
//!
//! Turns credential references into plaintext just before a client is built.
//! Plaintext is handed to the provider and never cached here.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::HashMap;
use tracing::debug;

use crate::crd::{CredentialReference, SecretStore};
use crate::error::{Result, SyncError};

/// Resolves credential references for a store
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Plaintext value of `reference`, as seen by an object in `namespace`
    ///
    /// # Errors
    /// `Configuration` when the reference crosses a namespace boundary the
    /// store may not cross; `CredentialResolution` when the value is missing
    /// or unreadable.
    async fn resolve(
        &self,
        store: &SecretStore,
        namespace: &str,
        reference: &CredentialReference,
    ) -> Result<String>;
}

/// Check that a reference stays inside the store's namespace
///
/// Namespaced stores may only name secrets in their own namespace. Cluster
/// stores may name any namespace.
///
/// # Errors
/// `Configuration` on a cross-namespace reference from a namespaced store.
pub fn validate_reference_scope(
    store: &SecretStore,
    reference: &CredentialReference,
) -> Result<()> {
    match (&store.namespace, &reference.namespace) {
        (Some(store_ns), Some(ref_ns)) if store_ns != ref_ns => Err(SyncError::Configuration(
            format!(
                "store {} may not reference credential {reference} outside its namespace",
                store.key()
            ),
        )),
        _ => Ok(()),
    }
}

/// Namespace a reference resolves in
///
/// # Errors
/// See [`validate_reference_scope`].
pub fn effective_namespace(
    store: &SecretStore,
    namespace: &str,
    reference: &CredentialReference,
) -> Result<String> {
    validate_reference_scope(store, reference)?;
    Ok(match (&store.namespace, &reference.namespace) {
        (Some(store_ns), _) => store_ns.clone(),
        (None, Some(ref_ns)) => ref_ns.clone(),
        (None, None) => namespace.to_string(),
    })
}

/// Reads credentials from Kubernetes `Secret` data
#[derive(Clone)]
pub struct KubeCredentialResolver {
    client: Client,
}

impl std::fmt::Debug for KubeCredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCredentialResolver").finish_non_exhaustive()
    }
}

impl KubeCredentialResolver {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialResolver for KubeCredentialResolver {
    async fn resolve(
        &self,
        store: &SecretStore,
        namespace: &str,
        reference: &CredentialReference,
    ) -> Result<String> {
        let secret_namespace = effective_namespace(store, namespace, reference)?;
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &secret_namespace);

        let unresolved = |message: String| SyncError::CredentialResolution {
            reference: format!("{secret_namespace}/{}[{}]", reference.name, reference.key),
            message,
        };

        let secret = secrets
            .get(&reference.name)
            .await
            .map_err(|e| unresolved(e.to_string()))?;
        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&reference.key))
            .ok_or_else(|| unresolved(format!("key {} not present", reference.key)))?;

        debug!(
            secret.namespace = secret_namespace.as_str(),
            secret.name = reference.name.as_str(),
            "resolved credential"
        );
        String::from_utf8(bytes.0.clone()).map_err(|e| unresolved(e.to_string()))
    }
}

/// Fixed credential table, keyed by `(namespace, name, key)`
///
/// Useful for local runs and tests where no cluster is available.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialResolver {
    values: HashMap<(String, String, String), String>,
}

impl StaticCredentialResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.values
            .insert((namespace.into(), name.into(), key.into()), value.into());
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        store: &SecretStore,
        namespace: &str,
        reference: &CredentialReference,
    ) -> Result<String> {
        let secret_namespace = effective_namespace(store, namespace, reference)?;
        let lookup = (
            secret_namespace.clone(),
            reference.name.clone(),
            reference.key.clone(),
        );
        self.values
            .get(&lookup)
            .cloned()
            .ok_or_else(|| SyncError::CredentialResolution {
                reference: format!("{secret_namespace}/{}[{}]", reference.name, reference.key),
                message: "not found".to_string(),
            })
    }
}
