//! # Provider Configuration
//!
//! Backend configuration variants. One variant per registered provider.

use serde::{Deserialize, Serialize};

use crate::provider::Capabilities;

/// Backend configuration
///
/// The `type` tag doubles as the registry key for the provider that
/// understands the variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProviderConfig {
    /// Sakura Cloud Secret Manager
    Sakura(SakuraConfig),
    /// In-process vault, for local runs and tests
    Memory(MemoryConfig),
}

impl ProviderConfig {
    /// Registry tag of the provider that handles this variant
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderConfig::Sakura(_) => "sakura",
            ProviderConfig::Memory(_) => "memory",
        }
    }

    /// Every credential reference declared by the variant
    #[must_use]
    pub fn credential_references(&self) -> Vec<&CredentialReference> {
        match self {
            ProviderConfig::Sakura(config) => vec![
                &config.auth.secret_ref.access_token,
                &config.auth.secret_ref.access_token_secret,
            ],
            ProviderConfig::Memory(_) => Vec::new(),
        }
    }
}

/// Pointer to a single key of a cluster secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialReference {
    /// Name of the secret holding the credential
    pub name: String,
    /// Key inside the secret's data
    pub key: String,
    /// Namespace of the secret. Only cluster-scoped stores may point
    /// outside their own namespace.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl std::fmt::Display for CredentialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}[{}]", self.name, self.key),
            None => write!(f, "{}[{}]", self.name, self.key),
        }
    }
}

/// Sakura Cloud Secret Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SakuraConfig {
    /// Resource ID of the target vault
    #[serde(default)]
    pub vault_resource_id: String,
    /// Zone hosting the vault (e.g., "is1a", "tk1b")
    #[serde(default)]
    pub zone: Option<String>,
    /// API base URL override. `{zone}` is substituted when present.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub auth: SakuraAuth,
}

/// Sakura Cloud authentication
///
/// Both the access token and its secret are required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SakuraAuth {
    pub secret_ref: SakuraSecretRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SakuraSecretRef {
    pub access_token: CredentialReference,
    pub access_token_secret: CredentialReference,
}

/// In-process vault configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Vault name. Stores naming the same vault share its contents.
    pub vault: String,
    /// Operations the vault accepts
    #[serde(default = "default_memory_capabilities")]
    pub capabilities: Capabilities,
}

fn default_memory_capabilities() -> Capabilities {
    Capabilities::ReadWrite
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sakura_config_deserialize() {
        let yaml = r"
type: sakura
vaultResourceId: '123456789012'
zone: tk1b
auth:
  secretRef:
    accessToken:
      name: sakura-creds
      key: access-token
    accessTokenSecret:
      name: sakura-creds
      key: access-token-secret
      namespace: shared
";
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tag(), "sakura");
        match &config {
            ProviderConfig::Sakura(sakura) => {
                assert_eq!(sakura.vault_resource_id, "123456789012");
                assert_eq!(sakura.zone.as_deref(), Some("tk1b"));
                assert_eq!(
                    sakura.auth.secret_ref.access_token_secret.namespace.as_deref(),
                    Some("shared")
                );
            }
            ProviderConfig::Memory(_) => panic!("Expected Sakura config"),
        }
        assert_eq!(config.credential_references().len(), 2);
    }

    #[test]
    fn test_memory_config_defaults_to_read_write() {
        let config: ProviderConfig = serde_yaml::from_str("type: memory\nvault: local").unwrap();
        assert_eq!(
            config,
            ProviderConfig::Memory(MemoryConfig {
                vault: "local".to_string(),
                capabilities: Capabilities::ReadWrite,
            })
        );
        assert!(config.credential_references().is_empty());
    }

    #[test]
    fn test_credential_reference_display() {
        let reference = CredentialReference {
            name: "creds".to_string(),
            key: "token".to_string(),
            namespace: None,
        };
        assert_eq!(reference.to_string(), "creds[token]");
    }
}
