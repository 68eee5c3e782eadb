//! # Provider Registry
//!
//! Maps a configuration variant tag to the provider that handles it.
//!
//! The registry is filled during bootstrap and then shared read-only behind an
//! `Arc`, so lookups need no synchronization.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{MaintenanceStatus, Provider};
use crate::crd::ProviderConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider {0:?} is already registered")]
    DuplicateProvider(String),
}

/// A provider and the status it was registered with
#[derive(Debug, Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn Provider>,
    pub maintenance: MaintenanceStatus,
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `tag`
    ///
    /// # Errors
    /// `DuplicateProvider` if the tag is taken. Two backends claiming one
    /// tag is a wiring bug, so bootstrap should abort on it.
    pub fn register(
        &mut self,
        tag: &str,
        provider: Arc<dyn Provider>,
        maintenance: MaintenanceStatus,
    ) -> Result<(), RegistryError> {
        if self.providers.contains_key(tag) {
            return Err(RegistryError::DuplicateProvider(tag.to_string()));
        }
        debug!(provider = tag, ?maintenance, "registered provider");
        self.providers.insert(
            tag.to_string(),
            RegisteredProvider {
                provider,
                maintenance,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<&RegisteredProvider> {
        self.providers.get(tag)
    }

    /// Provider handling a configuration variant
    #[must_use]
    pub fn for_config(&self, config: &ProviderConfig) -> Option<Arc<dyn Provider>> {
        self.lookup(config.tag())
            .map(|registered| Arc::clone(&registered.provider))
    }

    /// Registered tags, sorted
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}
