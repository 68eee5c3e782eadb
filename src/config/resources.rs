//! # Resource Manifest
//!
//! Stores and sync objects read from a single YAML file.
//!
//! ```yaml
//! stores:
//!   - name: vault
//!     namespace: payments
//!     provider: { type: memory, vault: local }
//! objects:
//!   - namespace: payments
//!     name: api
//!     data:
//!       - kind: secret
//!         store: { name: vault }
//!         secretKey: password
//!         remoteRef: { key: db-password }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::crd::{DataRequest, SecretStore, SyncObject};
use crate::provider::find::NameMatcher;
use crate::provider::ProviderRegistry;

/// Everything the controller reconciles
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManifest {
    #[serde(default)]
    pub stores: Vec<SecretStore>,
    #[serde(default)]
    pub objects: Vec<SyncObject>,
}

impl ResourceManifest {
    /// Parse a manifest from YAML text
    ///
    /// # Errors
    /// Returns an error on malformed YAML or duplicate store/object identities.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(text).context("Failed to parse resource manifest")?;
        manifest.check_unique()?;
        Ok(manifest)
    }

    fn check_unique(&self) -> Result<()> {
        let mut stores = BTreeSet::new();
        for store in &self.stores {
            if !stores.insert(store.key()) {
                bail!("duplicate store {}", store.key());
            }
        }
        let mut objects = BTreeSet::new();
        for object in &self.objects {
            if !objects.insert(object.key()) {
                bail!("duplicate sync object {}", object.key());
            }
        }
        Ok(())
    }

    /// Problems found without contacting any backend
    ///
    /// Checks that every store has a registered provider with a valid
    /// configuration, that every object references known stores and that
    /// every name filter compiles.
    #[must_use]
    pub fn problems(&self, registry: &ProviderRegistry) -> Vec<String> {
        let mut problems = Vec::new();
        for store in &self.stores {
            match registry.for_config(&store.provider) {
                Some(provider) => {
                    if let Err(e) = provider.validate_config(store) {
                        problems.push(format!("store {}: {e}", store.key()));
                    }
                }
                None => problems.push(format!(
                    "store {}: no provider registered for type {}",
                    store.key(),
                    store.provider.tag()
                )),
            }
        }

        let known: BTreeSet<_> = self.stores.iter().map(SecretStore::key).collect();
        for object in &self.objects {
            for store in object.store_keys() {
                if !known.contains(&store) {
                    problems.push(format!("object {}: store {store} not found", object.key()));
                }
            }
            for request in &object.data {
                if let DataRequest::Find { find, .. } = request {
                    if let Some(Err(e)) = find.name.as_deref().map(NameMatcher::compile) {
                        problems.push(format!("object {}: {e}", object.key()));
                    }
                }
            }
        }
        problems
    }
}

/// Read and parse the manifest at `path`
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_resources(path: &Path) -> Result<ResourceManifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read resource manifest {}", path.display()))?;
    ResourceManifest::from_yaml(&text)
        .with_context(|| format!("Invalid resource manifest {}", path.display()))
}
