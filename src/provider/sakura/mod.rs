//! # Sakura Cloud Provider
//!
//! Sakura Cloud Secret Manager backend.
//!
//! Authentication uses an API access token and its secret, both read from
//! cluster secrets each time a client is built. The API only filters by
//! name; tag filters are rejected.

mod api;
mod client;

pub use api::{ApiError, RestSecretApi, SecretApi, SecretSummary};
pub use client::SakuraClient;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::resolver::validate_reference_scope;
use super::{Capabilities, CredentialResolver, Provider, SecretsClient};
use crate::constants::{DEFAULT_BACKEND_HTTP_TIMEOUT_SECS, DEFAULT_SAKURA_ZONE, SAKURA_API_BASE_TEMPLATE};
use crate::crd::{CredentialReference, ProviderConfig, SakuraConfig, SecretStore};
use crate::error::{Result, SyncError};

/// Sakura Cloud provider
#[derive(Debug, Clone)]
pub struct SakuraProvider {
    http_timeout: Duration,
}

impl Default for SakuraProvider {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_BACKEND_HTTP_TIMEOUT_SECS),
        }
    }
}

impl SakuraProvider {
    #[must_use]
    pub fn new(http_timeout: Duration) -> Self {
        Self { http_timeout }
    }
}

fn sakura_config(store: &SecretStore) -> Result<&SakuraConfig> {
    match &store.provider {
        ProviderConfig::Sakura(config) => Ok(config),
        other => Err(SyncError::Configuration(format!(
            "invalid provider spec: store {} has provider {}, expected sakura",
            store.key(),
            other.tag()
        ))),
    }
}

fn check_reference(store: &SecretStore, field: &str, reference: &CredentialReference) -> Result<()> {
    if reference.name.is_empty() || reference.key.is_empty() {
        return Err(SyncError::Configuration(format!(
            "invalid {field}: name and key are required"
        )));
    }
    validate_reference_scope(store, reference)
        .map_err(|e| SyncError::Configuration(format!("invalid {field}: {e}")))
}

/// API base URL for `config`
#[must_use]
pub fn base_url(config: &SakuraConfig) -> String {
    let zone = config.zone.as_deref().unwrap_or(DEFAULT_SAKURA_ZONE);
    config
        .endpoint
        .as_deref()
        .unwrap_or(SAKURA_API_BASE_TEMPLATE)
        .replace("{zone}", zone)
}

#[async_trait]
impl Provider for SakuraProvider {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ReadWrite
    }

    fn validate_config(&self, store: &SecretStore) -> Result<Vec<String>> {
        let config = sakura_config(store)?;
        if config.vault_resource_id.is_empty() {
            return Err(SyncError::Configuration(
                "vaultResourceId is required".to_string(),
            ));
        }
        let refs = &config.auth.secret_ref;
        check_reference(store, "auth.secretRef.accessToken", &refs.access_token)?;
        check_reference(
            store,
            "auth.secretRef.accessTokenSecret",
            &refs.access_token_secret,
        )?;
        Ok(Vec::new())
    }

    async fn new_client(
        &self,
        store: &SecretStore,
        resolver: &dyn CredentialResolver,
        namespace: &str,
    ) -> Result<Box<dyn SecretsClient>> {
        self.validate_config(store)?;
        let config = sakura_config(store)?;
        let refs = &config.auth.secret_ref;

        let access_token = resolver
            .resolve(store, namespace, &refs.access_token)
            .await?;
        let access_token_secret = resolver
            .resolve(store, namespace, &refs.access_token_secret)
            .await?;

        let base = base_url(config);
        info!(
            "Initializing Sakura client for vault {} at {}",
            config.vault_resource_id, base
        );
        let api = RestSecretApi::new(
            &base,
            &config.vault_resource_id,
            access_token,
            access_token_secret,
            self.http_timeout,
        )?;
        Ok(Box::new(SakuraClient::new(Arc::new(api))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{SakuraAuth, SakuraSecretRef};
    use crate::error::ErrorKind;
    use crate::provider::resolver::StaticCredentialResolver;

    fn reference(name: &str, key: &str, namespace: Option<&str>) -> CredentialReference {
        CredentialReference {
            name: name.to_string(),
            key: key.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    fn store(secret_namespace: Option<&str>) -> SecretStore {
        SecretStore {
            name: "sakura".to_string(),
            namespace: Some("default".to_string()),
            provider: ProviderConfig::Sakura(SakuraConfig {
                vault_resource_id: "113700000000".to_string(),
                zone: None,
                endpoint: None,
                auth: SakuraAuth {
                    secret_ref: SakuraSecretRef {
                        access_token: reference("creds", "token", secret_namespace),
                        access_token_secret: reference("creds", "secret", secret_namespace),
                    },
                },
            }),
        }
    }

    #[test]
    fn test_validate_config() {
        let provider = SakuraProvider::default();
        assert!(provider.validate_config(&store(None)).unwrap().is_empty());
        assert_eq!(
            provider
                .validate_config(&store(Some("other")))
                .unwrap_err()
                .kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_validate_config_requires_vault() {
        let mut store = store(None);
        if let ProviderConfig::Sakura(config) = &mut store.provider {
            config.vault_resource_id.clear();
        }
        let err = SakuraProvider::default().validate_config(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_config_rejects_other_variant() {
        let store = SecretStore {
            name: "mem".to_string(),
            namespace: None,
            provider: ProviderConfig::Memory(crate::crd::MemoryConfig {
                vault: "v".to_string(),
                capabilities: Capabilities::ReadWrite,
            }),
        };
        let err = SakuraProvider::default().validate_config(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_base_url() {
        let ProviderConfig::Sakura(mut config) = store(None).provider else {
            panic!("Expected Sakura config");
        };
        assert_eq!(
            base_url(&config),
            "https://secure.sakura.ad.jp/cloud/zone/is1a/api/cloud/1.1"
        );
        config.zone = Some("tk1b".to_string());
        assert_eq!(
            base_url(&config),
            "https://secure.sakura.ad.jp/cloud/zone/tk1b/api/cloud/1.1"
        );
        config.endpoint = Some("http://localhost:8080".to_string());
        assert_eq!(base_url(&config), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_new_client_fails_on_missing_credentials() {
        let resolver = StaticCredentialResolver::new().with("default", "creds", "token", "t");
        let err = SakuraProvider::default()
            .new_client(&store(None), &resolver, "default")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialResolution);
    }

    #[tokio::test]
    async fn test_new_client_with_credentials() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let resolver = StaticCredentialResolver::new()
            .with("default", "creds", "token", "t")
            .with("default", "creds", "secret", "s");
        let client = SakuraProvider::default()
            .new_client(&store(None), &resolver, "default")
            .await;
        assert!(client.is_ok());
    }
}
