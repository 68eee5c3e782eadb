//! Sakura Cloud Secret Manager client
//!
//! Maps the normalized client operations onto [`SecretApi`]. Values are
//! stored as text on this backend, so pushed bytes must be UTF-8.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::api::{ApiError, SecretApi};
use crate::crd::{FindQuery, PushSpec, RemoteRef, SecretData};
use crate::error::{Result, SyncError};
use crate::provider::common::{self, SecretComparison};
use crate::provider::{extract, find, SecretsClient, ValidationResult};

const PROVIDER: &str = "sakura";

/// Client for one Sakura vault
#[derive(Clone)]
pub struct SakuraClient {
    api: Arc<dyn SecretApi>,
}

impl std::fmt::Debug for SakuraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SakuraClient").finish_non_exhaustive()
    }
}

impl SakuraClient {
    #[must_use]
    pub fn new(api: Arc<dyn SecretApi>) -> Self {
        Self { api }
    }

    async fn unveil(&self, name: &str, version: Option<u64>) -> Result<Vec<u8>> {
        let start = Instant::now();
        let value = self
            .api
            .unveil(name, version)
            .await
            .map_err(|e| e.into_sync_error("unveil"))?;
        common::record_operation(PROVIDER, "unveil", start);
        Ok(value.into_bytes())
    }

    /// Latest value, `None` when the secret does not exist
    async fn current_value(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.api.unveil(name, None).await {
            Ok(value) => Ok(Some(value.into_bytes())),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into_sync_error("unveil")),
        }
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let secrets = self
            .api
            .list()
            .await
            .map_err(|e| e.into_sync_error("list"))?;
        common::record_operation(PROVIDER, "list", start);
        Ok(secrets.into_iter().map(|s| s.name).collect())
    }
}

#[async_trait]
impl SecretsClient for SakuraClient {
    async fn get_secret(&self, remote_ref: &RemoteRef) -> Result<Vec<u8>> {
        let version = extract::parse_version(remote_ref.version())?;
        let value = self.unveil(&remote_ref.key, version).await?;
        match &remote_ref.property {
            Some(property) => extract::select_property(&remote_ref.key, &value, property),
            None => Ok(value),
        }
    }

    async fn get_secret_map(&self, remote_ref: &RemoteRef) -> Result<SecretData> {
        let version = extract::parse_version(remote_ref.version())?;
        let value = self.unveil(&remote_ref.key, version).await?;
        extract::flatten_json_object(&remote_ref.key, &value)
    }

    async fn get_all_secrets(&self, query: &FindQuery) -> Result<SecretData> {
        if query.tags.as_ref().is_some_and(|tags| !tags.is_empty()) {
            return Err(SyncError::Configuration(
                "sakura stores only support name filters in find queries".to_string(),
            ));
        }
        let matcher = find::compile_optional(query.name.as_deref())?;
        let names = self.list_names().await?;
        common::fetch_matching(names, matcher.as_ref(), |name| async move {
            let value = self.unveil(&name, None).await?;
            Ok((name, value))
        })
        .await
    }

    async fn push_secret(&self, spec: &PushSpec, source: &SecretData) -> Result<()> {
        let mut value = extract::push_value(spec, source)?;
        let current = self.current_value(&spec.remote_key).await?;
        if let Some(property) = &spec.property {
            value = extract::merge_property(&spec.remote_key, current.as_deref(), property, &value)?;
        }

        let comparison =
            common::compare_secret_value(|| async { Ok(current.clone()) }, &value).await?;
        common::log_push_operation(PROVIDER, &spec.remote_key, comparison);
        if comparison == SecretComparison::Unchanged {
            return Ok(());
        }

        let text = String::from_utf8(value).map_err(|e| {
            SyncError::UnsupportedOperation(format!(
                "sakura stores text values; {} is not UTF-8: {e}",
                spec.remote_key
            ))
        })?;
        let start = Instant::now();
        self.api
            .create(&spec.remote_key, &text)
            .await
            .map_err(|e| e.into_sync_error("create"))?;
        common::record_operation(PROVIDER, "create", start);
        Ok(())
    }

    async fn delete_secret(&self, remote_key: &str) -> Result<()> {
        let start = Instant::now();
        match self.api.delete(remote_key).await {
            Ok(()) => {}
            Err(ApiError::NotFound(_)) => {
                debug!("Sakura secret {} already absent", remote_key);
            }
            Err(e) => return Err(e.into_sync_error("delete")),
        }
        common::record_operation(PROVIDER, "delete", start);
        Ok(())
    }

    async fn secret_exists(&self, remote_key: &str) -> Result<bool> {
        Ok(self.list_names().await?.iter().any(|name| name == remote_key))
    }

    async fn validate(&self) -> Result<ValidationResult> {
        self.list_names().await?;
        Ok(ValidationResult::Ready)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
