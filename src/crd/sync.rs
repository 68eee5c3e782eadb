//! # Sync Objects
//!
//! A sync object names the secrets to pull from stores and the values to push
//! back to them. The scheduler reconciles each object independently.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{StoreKey, StoreRef};

/// Normalized secret payload: key to raw bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Identifies one secret value in a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    pub key: String,
    /// Backend version token; empty means latest
    #[serde(default)]
    pub version: Option<String>,
    /// Top-level field of a JSON payload
    #[serde(default)]
    pub property: Option<String>,
}

impl RemoteRef {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Version token, treating an empty string as absent
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }
}

/// Bulk-fetch query
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindQuery {
    /// Regular expression matched against the whole secret name
    #[serde(default)]
    pub name: Option<String>,
    /// Every tag must be present with the given value
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
}

/// Describes one value to push to a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSpec {
    /// Field of the source data to push; absent pushes the whole source as JSON
    #[serde(default)]
    pub source_key: Option<String>,
    pub remote_key: String,
    #[serde(default)]
    pub property: Option<String>,
}

/// One pull operation of a sync object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum DataRequest {
    /// Fetch one value into `secret_key`
    Secret {
        store: StoreRef,
        secret_key: String,
        remote_ref: RemoteRef,
    },
    /// Fetch a JSON object and merge its top-level keys
    Extract { store: StoreRef, remote_ref: RemoteRef },
    /// Fetch every secret matching the query, keyed by secret name
    Find { store: StoreRef, find: FindQuery },
}

impl DataRequest {
    #[must_use]
    pub fn store(&self) -> &StoreRef {
        match self {
            DataRequest::Secret { store, .. }
            | DataRequest::Extract { store, .. }
            | DataRequest::Find { store, .. } => store,
        }
    }
}

/// One push operation of a sync object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub store: StoreRef,
    #[serde(flatten)]
    pub spec: PushSpec,
}

/// What happens to remote keys an object stops pushing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum DeletionPolicy {
    #[default]
    Retain,
    Delete,
}

/// Identity of a sync object
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, schemars::JsonSchema,
)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Configuration object reconciled by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncObject {
    pub namespace: String,
    pub name: String,
    /// Interval between successful passes; falls back to the controller default
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    #[serde(default)]
    pub data: Vec<DataRequest>,
    #[serde(default)]
    pub push: Vec<PushRequest>,
    /// Cluster secret contents pushed by `push` requests (base64 values)
    #[serde(default, with = "base64_data")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub source_data: SecretData,
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

impl SyncObject {
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Every store this object reads from or writes to
    #[must_use]
    pub fn store_keys(&self) -> BTreeSet<StoreKey> {
        self.data
            .iter()
            .map(DataRequest::store)
            .chain(self.push.iter().map(|p| &p.store))
            .map(|store| store.resolve(&self.namespace))
            .collect()
    }

    /// Remote keys written by this object, per store
    #[must_use]
    pub fn pushed_keys(&self) -> BTreeSet<(StoreKey, String)> {
        self.push
            .iter()
            .map(|p| (p.store.resolve(&self.namespace), p.spec.remote_key.clone()))
            .collect()
    }
}

/// Serde adapter encoding byte values as base64 strings, like Secret `data`
mod base64_data {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    use super::SecretData;

    pub fn serialize<S: Serializer>(data: &SecretData, serializer: S) -> Result<S::Ok, S::Error> {
        data.iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretData, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(v.as_bytes())
                    .map(|bytes| (k.clone(), bytes))
                    .map_err(|e| D::Error::custom(format!("sourceData.{k}: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::StoreKind;

    fn object_yaml() -> &'static str {
        r"
namespace: payments
name: api-credentials
refreshIntervalSecs: 60
deletionPolicy: Delete
data:
  - kind: secret
    store: { name: vault }
    secretKey: password
    remoteRef: { key: db-password, version: '2' }
  - kind: find
    store: { name: shared, kind: ClusterSecretStore }
    find: { name: '^api-.*' }
push:
  - store: { name: vault }
    sourceKey: token
    remoteKey: api-token
sourceData:
  token: c2VjcmV0
"
    }

    #[test]
    fn test_sync_object_deserialize() {
        let object: SyncObject = serde_yaml::from_str(object_yaml()).unwrap();
        assert_eq!(object.key(), ObjectKey::new("payments", "api-credentials"));
        assert_eq!(object.deletion_policy, DeletionPolicy::Delete);
        assert_eq!(object.source_data.get("token"), Some(&b"secret".to_vec()));
        assert_eq!(object.push[0].spec.remote_key, "api-token");
        match &object.data[0] {
            DataRequest::Secret { remote_ref, .. } => {
                assert_eq!(remote_ref.version(), Some("2"));
            }
            other => panic!("Expected secret request, got {other:?}"),
        }
        assert_eq!(object.data[1].store().kind, StoreKind::ClusterSecretStore);
    }

    #[test]
    fn test_store_keys_resolve_against_object_namespace() {
        let object: SyncObject = serde_yaml::from_str(object_yaml()).unwrap();
        let keys: Vec<_> = object.store_keys().into_iter().collect();
        assert_eq!(
            keys,
            vec![
                StoreKey::cluster("shared"),
                StoreKey::namespaced("payments", "vault"),
            ]
        );
        assert!(object
            .pushed_keys()
            .contains(&(StoreKey::namespaced("payments", "vault"), "api-token".to_string())));
    }

    #[test]
    fn test_invalid_base64_source_data_is_rejected() {
        let yaml = "namespace: a\nname: b\nsourceData:\n  token: '!!!'\n";
        let err = serde_yaml::from_str::<SyncObject>(yaml).unwrap_err();
        assert!(err.to_string().contains("sourceData.token"));
    }

    #[test]
    fn test_empty_version_means_latest() {
        assert_eq!(RemoteRef::new("k").with_version("").version(), None);
        assert_eq!(RemoteRef::new("k").version(), None);
    }
}
