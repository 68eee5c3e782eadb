//! # Configuration Loading Tests
//!
//! Resource manifests read from disk and controller settings read from
//! environment-style lookups.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use secret_sync_controller::config::{load_resources, ControllerConfig};
use secret_sync_controller::crd::{DeletionPolicy, ProviderConfig, StoreKey};

const MANIFEST: &str = r"
stores:
  - name: sakura
    provider:
      type: sakura
      vaultResourceId: '113600000000'
      auth:
        secretRef:
          accessToken: { name: sakura-credentials, namespace: ops, key: token }
          accessTokenSecret: { name: sakura-credentials, namespace: ops, key: secret }
  - name: local
    namespace: payments
    provider: { type: memory, vault: local }
objects:
  - namespace: payments
    name: api
    refreshIntervalSecs: 60
    deletionPolicy: Delete
    data:
      - kind: secret
        store: { name: sakura, kind: ClusterSecretStore }
        secretKey: password
        remoteRef: { key: db-password, version: '2' }
    push:
      - store: { name: local }
        sourceKey: token
        remoteKey: api-token
    sourceData:
      token: czNjcjN0
";

#[test]
fn test_load_resources_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MANIFEST.as_bytes()).unwrap();

    let manifest = load_resources(file.path()).unwrap();
    assert_eq!(manifest.stores.len(), 2);
    assert_eq!(manifest.stores[0].key(), StoreKey::cluster("sakura"));
    match &manifest.stores[0].provider {
        ProviderConfig::Sakura(config) => assert_eq!(config.vault_resource_id,"113600000000"),
        other => panic!("unexpected provider {other:?}"),
    }

    let object = &manifest.objects[0];
    assert_eq!(object.refresh_interval_secs, Some(60));
    assert_eq!(object.deletion_policy, DeletionPolicy::Delete);
    assert_eq!(object.source_data["token"], b"s3cr3t".to_vec());
    assert_eq!(
        object.store_keys().into_iter().collect::<Vec<_>>(),
        vec![
            StoreKey::cluster("sakura"),
            StoreKey::namespaced("payments", "local")
        ]
    );
}

#[test]
fn test_load_resources_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.yaml");
    let err = load_resources(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}

#[test]
fn test_controller_config_from_lookup() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("MAX_CONCURRENT_RECONCILIATIONS", "3"),
        ("BACKOFF_START_MS", "250"),
        ("ENABLE_FLOOD_GATE", "false"),
        ("RECONCILE_TIMEOUT_SECS", "not-a-number"),
    ]);
    let config = ControllerConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));

    let scheduler = config.scheduler_config();
    assert_eq!(scheduler.max_concurrent, 3);
    assert_eq!(scheduler.backoff_start, Duration::from_millis(250));
    assert!(!scheduler.flood_gate);
    assert_eq!(
        scheduler.pass_timeout,
        ControllerConfig::default().scheduler_config().pass_timeout
    );
    assert!(config.warnings().is_empty());
}
