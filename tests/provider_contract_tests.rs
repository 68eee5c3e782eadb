//! # Provider Contract Tests
//!
//! Behaviour every `SecretsClient` must show, checked against the in-memory
//! backend through the trait objects the scheduler uses.

use std::sync::Arc;

use secret_sync_controller::prelude::*;
use secret_sync_controller::provider::resolver::StaticCredentialResolver;

async fn client(provider: &MemoryProvider, vault: &str) -> Box<dyn SecretsClient> {
    let store = SecretStore {
        name: "mem".to_string(),
        namespace: Some("default".to_string()),
        provider: ProviderConfig::Memory(MemoryConfig {
            vault: vault.to_string(),
            capabilities: Capabilities::ReadWrite,
        }),
    };
    provider
        .new_client(&store, &StaticCredentialResolver::new(), "default")
        .await
        .unwrap()
}

fn push_spec(remote_key: &str) -> PushSpec {
    PushSpec {
        source_key: Some("value".to_string()),
        remote_key: remote_key.to_string(),
        property: None,
    }
}

fn source(value: &str) -> SecretData {
    SecretData::from([("value".to_string(), value.as_bytes().to_vec())])
}

#[tokio::test]
async fn test_push_then_get_round_trips() {
    let provider = MemoryProvider::default();
    let client = client(&provider, "v").await;

    client
        .push_secret(&push_spec("api-key"), &source("abc123"))
        .await
        .unwrap();
    assert_eq!(
        client.get_secret(&RemoteRef::new("api-key")).await.unwrap(),
        b"abc123".to_vec()
    );
    assert!(client.secret_exists("api-key").await.unwrap());

    // An identical push writes nothing new.
    client
        .push_secret(&push_spec("api-key"), &source("abc123"))
        .await
        .unwrap();
    assert_eq!(provider.vault("v").version_count("api-key"), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let provider = MemoryProvider::default();
    provider.vault("v").seed("old", "x");
    let client = client(&provider, "v").await;

    client.delete_secret("old").await.unwrap();
    client.delete_secret("old").await.unwrap();
    client.delete_secret("never-existed").await.unwrap();

    let err = client.get_secret(&RemoteRef::new("old")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecretNotFound);
    assert!(!client.secret_exists("old").await.unwrap());
}

#[tokio::test]
async fn test_secret_map_flattens_scalars() {
    let provider = MemoryProvider::default();
    provider
        .vault("v")
        .seed("config", r#"{"a":"x","b":42,"c":true}"#);
    let client = client(&provider, "v").await;

    let map = client
        .get_secret_map(&RemoteRef::new("config"))
        .await
        .unwrap();
    assert_eq!(
        map,
        SecretData::from([
            ("a".to_string(), b"x".to_vec()),
            ("b".to_string(), b"42".to_vec()),
            ("c".to_string(), b"true".to_vec()),
        ])
    );

    provider.vault("v").seed("plain", "not json");
    let err = client
        .get_secret_map(&RemoteRef::new("plain"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedPayload);
}

#[tokio::test]
async fn test_version_selection() {
    let provider = MemoryProvider::default();
    let vault = provider.vault("v");
    vault.seed("k", "one");
    vault.seed("k", "two");
    vault.seed("k", "three");
    let client = client(&provider, "v").await;

    let latest = client
        .get_secret(&RemoteRef::new("k").with_version(""))
        .await
        .unwrap();
    assert_eq!(latest, b"three".to_vec());
    let second = client
        .get_secret(&RemoteRef::new("k").with_version("2"))
        .await
        .unwrap();
    assert_eq!(second, b"two".to_vec());

    let gets_before = vault.stats().gets;
    let err = client
        .get_secret(&RemoteRef::new("k").with_version("abc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidVersion);
    assert_eq!(vault.stats().gets, gets_before, "invalid version must not reach the backend");
}

#[tokio::test]
async fn test_find_filters_by_name_and_tags() {
    let provider = MemoryProvider::default();
    let vault = provider.vault("v");
    vault.seed_with_tags(
        "test-one",
        "1",
        [("team".to_string(), "payments".to_string())].into(),
    );
    vault.seed("test-two", "2");
    vault.seed("prod-one", "3");
    let client = client(&provider, "v").await;

    let found = client
        .get_all_secrets(&FindQuery {
            name: Some("^test-.*".to_string()),
            tags: None,
        })
        .await
        .unwrap();
    let names: Vec<&str> = found.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["test-one", "test-two"]);

    let tagged = client
        .get_all_secrets(&FindQuery {
            name: None,
            tags: Some([("team".to_string(), "payments".to_string())].into()),
        })
        .await
        .unwrap();
    assert_eq!(tagged.keys().collect::<Vec<_>>(), vec!["test-one"]);
}

#[tokio::test]
async fn test_invalid_pattern_is_rejected() {
    let provider = MemoryProvider::default();
    let client = client(&provider, "v").await;
    let err = client
        .get_all_secrets(&FindQuery {
            name: Some("[".to_string()),
            tags: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPattern);
    assert_eq!(provider.vault("v").stats().lists, 0);
}

#[tokio::test]
async fn test_registry_dispatches_by_variant() {
    let memory = Arc::new(MemoryProvider::default());
    let mut registry = ProviderRegistry::new();
    registry
        .register("memory", memory, MaintenanceStatus::Maintained)
        .unwrap();
    let config = ProviderConfig::Memory(MemoryConfig {
        vault: "v".to_string(),
        capabilities: Capabilities::ReadOnly,
    });
    assert!(registry.for_config(&config).is_some());
    assert!(registry
        .register(
            "memory",
            Arc::new(MemoryProvider::default()),
            MaintenanceStatus::NotMaintained
        )
        .is_err());
}

#[tokio::test]
async fn test_push_without_source_key_stores_whole_source() {
    let provider = MemoryProvider::default();
    let client = client(&provider, "v").await;
    let spec = PushSpec {
        source_key: None,
        remote_key: "db".to_string(),
        property: None,
    };
    let source = SecretData::from([
        ("user".to_string(), b"admin".to_vec()),
        ("password".to_string(), b"hunter2".to_vec()),
    ]);

    client.push_secret(&spec, &source).await.unwrap();

    // Source values are raw bytes, so each one is stored base64-encoded.
    assert_eq!(
        client.get_secret(&RemoteRef::new("db")).await.unwrap(),
        br#"{"password":"aHVudGVyMg==","user":"YWRtaW4="}"#.to_vec()
    );
    let map = client.get_secret_map(&RemoteRef::new("db")).await.unwrap();
    assert_eq!(map["user"], b"YWRtaW4=".to_vec());

    client.push_secret(&spec, &source).await.unwrap();
    assert_eq!(provider.vault("v").version_count("db"), 1);
}
