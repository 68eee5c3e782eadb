//! # Secret Stores
//!
//! A store binds a backend configuration to a scope. Namespaced stores serve
//! objects of their own namespace; cluster stores serve every namespace.

use serde::{Deserialize, Serialize};

use super::ProviderConfig;

/// Identity of a store
///
/// `namespace` is `None` for cluster-scoped stores.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct StoreKey {
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
}

impl StoreKey {
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "cluster/{}", self.name),
        }
    }
}

/// Kind of store an object refers to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum StoreKind {
    #[default]
    SecretStore,
    ClusterSecretStore,
}

/// Reference from a sync object to a store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreRef {
    pub name: String,
    #[serde(default)]
    pub kind: StoreKind,
}

impl StoreRef {
    /// Resolve the reference as seen from an object in `namespace`
    #[must_use]
    pub fn resolve(&self, namespace: &str) -> StoreKey {
        match self.kind {
            StoreKind::SecretStore => StoreKey::namespaced(namespace, &self.name),
            StoreKind::ClusterSecretStore => StoreKey::cluster(&self.name),
        }
    }
}

/// A configured backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretStore {
    pub name: String,
    /// Namespace of a namespaced store; absent for cluster stores
    #[serde(default)]
    pub namespace: Option<String>,
    pub provider: ProviderConfig,
}

impl SecretStore {
    #[must_use]
    pub fn key(&self) -> StoreKey {
        StoreKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    #[must_use]
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_none()
    }
}
