//! Sakura Cloud Secret Manager REST API
//!
//! Only the four calls the client needs: list, unveil, create and delete.
//! Create doubles as update on this API.
//!
//! References:
//! - [Secret Manager API](https://manual.sakura.ad.jp/api/cloud/secretmanager/)

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::SyncError;

/// Secret metadata as returned by the list call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecretSummary {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "LatestVersion", default)]
    pub latest_version: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("secret {0} not found")]
    NotFound(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Map to the controller's taxonomy
    ///
    /// Authentication failures surface as connect errors so the store is
    /// reported unreachable rather than the individual secret.
    #[must_use]
    pub fn into_sync_error(self, operation: &str) -> SyncError {
        match self {
            ApiError::NotFound(key) => SyncError::SecretNotFound { key },
            ApiError::Transport(message) => {
                SyncError::BackendConnect(format!("sakura {operation}: {message}"))
            }
            ApiError::Status { status: 401 | 403, body } => {
                SyncError::BackendConnect(format!("sakura {operation}: unauthorized: {body}"))
            }
            other => SyncError::Backend(format!("sakura {operation}: {other}")),
        }
    }
}

/// Secret operations of one vault
#[async_trait]
pub trait SecretApi: Send + Sync {
    async fn list(&self) -> Result<Vec<SecretSummary>, ApiError>;

    /// Plaintext of `name`; `version` `None` means latest
    async fn unveil(&self, name: &str, version: Option<u64>) -> Result<String, ApiError>;

    /// Create `name`, or add a new version when it exists
    async fn create(&self, name: &str, value: &str) -> Result<(), ApiError>;

    async fn delete(&self, name: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "Secrets", default)]
    secrets: Vec<SecretSummary>,
}

#[derive(Debug, Serialize)]
struct SecretEnvelope<T> {
    #[serde(rename = "Secret")]
    secret: T,
}

#[derive(Debug, Serialize)]
struct UnveilRequest<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Version", skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UnveilResponse {
    #[serde(rename = "Secret")]
    secret: UnveiledSecret,
}

#[derive(Debug, Deserialize)]
struct UnveiledSecret {
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
}

/// REST implementation of [`SecretApi`] with basic authentication
pub struct RestSecretApi {
    http_client: Client,
    secrets_url: String,
    access_token: String,
    access_token_secret: String,
}

impl std::fmt::Debug for RestSecretApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSecretApi")
            .field("secrets_url", &self.secrets_url)
            .finish_non_exhaustive()
    }
}

impl RestSecretApi {
    /// Client for the vault `vault_id` under `base_url`
    ///
    /// # Errors
    /// `BackendConnect` when the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        vault_id: &str,
        access_token: String,
        access_token_secret: String,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::BackendConnect(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            secrets_url: format!(
                "{}/secretmanager/vaults/{vault_id}/secrets",
                base_url.trim_end_matches('/')
            ),
            access_token,
            access_token_secret,
        })
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        name: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .basic_auth(&self.access_token, Some(&self.access_token_secret));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        debug!("Sakura {} {} -> {}", method, url, status);

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(name) = name {
                return Err(ApiError::NotFound(name.to_string()));
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SecretApi for RestSecretApi {
    async fn list(&self) -> Result<Vec<SecretSummary>, ApiError> {
        let response = self
            .send::<()>(Method::GET, &self.secrets_url, None, None)
            .await?;
        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(list.secrets)
    }

    async fn unveil(&self, name: &str, version: Option<u64>) -> Result<String, ApiError> {
        let url = format!("{}/unveil", self.secrets_url);
        let body = SecretEnvelope {
            secret: UnveilRequest { name, version },
        };
        let response = self.send(Method::POST, &url, Some(&body), Some(name)).await?;
        let unveiled: UnveilResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(unveiled.secret.value)
    }

    async fn create(&self, name: &str, value: &str) -> Result<(), ApiError> {
        let body = SecretEnvelope {
            secret: CreateRequest { name, value },
        };
        self.send(Method::POST, &self.secrets_url, Some(&body), None)
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ApiError> {
        let body = SecretEnvelope {
            secret: DeleteRequest { name },
        };
        self.send(Method::DELETE, &self.secrets_url, Some(&body), Some(name))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_secrets_url() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let api = RestSecretApi::new(
            "https://secure.sakura.ad.jp/cloud/zone/is1a/api/cloud/1.1/",
            "113700000000",
            "token".to_string(),
            "secret".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            api.secrets_url,
            "https://secure.sakura.ad.jp/cloud/zone/is1a/api/cloud/1.1/secretmanager/vaults/113700000000/secrets"
        );
        assert!(!format!("{api:?}").contains("token"));
    }

    #[test]
    fn test_request_bodies() {
        let unveil = SecretEnvelope {
            secret: UnveilRequest {
                name: "db",
                version: None,
            },
        };
        assert_eq!(
            serde_json::to_string(&unveil).unwrap(),
            r#"{"Secret":{"Name":"db"}}"#
        );

        let create = SecretEnvelope {
            secret: CreateRequest {
                name: "db",
                value: "pw",
            },
        };
        assert_eq!(
            serde_json::to_string(&create).unwrap(),
            r#"{"Secret":{"Name":"db","Value":"pw"}}"#
        );
    }

    #[test]
    fn test_list_response() {
        let list: ListResponse = serde_json::from_str(
            r#"{"Count":2,"Secrets":[{"Name":"a","LatestVersion":3},{"Name":"b"}]}"#,
        )
        .unwrap();
        assert_eq!(list.secrets.len(), 2);
        assert_eq!(list.secrets[0].latest_version, Some(3));
        assert_eq!(list.secrets[1].latest_version, None);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ApiError::NotFound("k".to_string()).into_sync_error("unveil").kind(),
            ErrorKind::SecretNotFound
        );
        assert_eq!(
            ApiError::Transport("refused".to_string()).into_sync_error("list").kind(),
            ErrorKind::BackendConnect
        );
        assert_eq!(
            ApiError::Status {
                status: 401,
                body: String::new()
            }
            .into_sync_error("list")
            .kind(),
            ErrorKind::BackendConnect
        );
        assert_eq!(
            ApiError::Status {
                status: 500,
                body: String::new()
            }
            .into_sync_error("create")
            .kind(),
            ErrorKind::Backend
        );
    }
}
