//! Sync controller integration tests against the in-memory clients.

mod common;

use common::*;
use keywheel::clients::{
    ClusterSecrets, InMemoryClusterSecrets, InMemorySecretStore, SecretStore, VersionState,
};
use keywheel::config::{ClusterLocation, Configuration, SecretManagerLocation, SyncSpec};
use keywheel::sync::SyncController;
use std::sync::Arc;

fn sync_spec(project: &str, secret: &str, ns: &str, name: &str, key: &str) -> SyncSpec {
    SyncSpec {
        source: SecretManagerLocation { project: project.to_string(), secret: secret.to_string() },
        destination: ClusterLocation {
            namespace: ns.to_string(),
            secret: name.to_string(),
            key: key.to_string(),
        },
    }
}

fn controller_for(
    store: &Arc<InMemorySecretStore>,
    cluster: &Arc<InMemoryClusterSecrets>,
) -> SyncController {
    SyncController::new(
        store.clone() as Arc<dyn SecretStore>,
        cluster.clone() as Arc<dyn ClusterSecrets>,
        agent_with(Configuration::default()),
    )
}

fn store_with(project: &str, secret: &str, data: &[u8]) -> Arc<InMemorySecretStore> {
    let store = Arc::new(InMemorySecretStore::new(&[project]));
    store.add_version(project, secret, 1, time("2000-01-01T00:00:00Z"), data, VersionState::Enabled);
    store
}

#[tokio::test]
async fn test_sync_equal_values_is_a_noop() {
    let store = store_with("project-1", "gsm-old-token", b"old-token");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));
    cluster.set_value("ns-a", "secret-a", "key-a", b"old-token");

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-old-token", "ns-a", "secret-a", "key-a");

    let updated = controller.sync(&spec).await.unwrap();
    assert!(!updated);
    assert_eq!(cluster.write_count(), 0);
}

#[tokio::test]
async fn test_sync_missing_key_writes_and_preserves_siblings() {
    let store = store_with("project-1", "gsm-token", b"v1");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));
    cluster.set_value("ns-a", "secret-a", "key-a", b"old-token");

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-token", "ns-a", "secret-a", "missed");

    let updated = controller.sync(&spec).await.unwrap();
    assert!(updated);

    assert_eq!(
        cluster.get_secret_value("ns-a", "secret-a", "missed").await.unwrap().as_deref(),
        Some(b"v1".as_slice())
    );
    assert_eq!(
        cluster.get_secret_value("ns-a", "secret-a", "key-a").await.unwrap().as_deref(),
        Some(b"old-token".as_slice())
    );
}

#[tokio::test]
async fn test_sync_creates_missing_destination_secret() {
    let store = store_with("project-1", "gsm-token", b"v1");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-token", "ns-a", "brand-new", "key-a");

    assert!(controller.sync(&spec).await.unwrap());
    assert!(cluster.validate_secret("ns-a", "brand-new").await.is_ok());
    assert_eq!(
        cluster.get_secret_value("ns-a", "brand-new", "key-a").await.unwrap().as_deref(),
        Some(b"v1".as_slice())
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let store = store_with("project-1", "gsm-token", b"v1");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-token", "ns-a", "secret-a", "key-a");

    assert!(controller.sync(&spec).await.unwrap());
    assert!(!controller.sync(&spec).await.unwrap());
    assert_eq!(cluster.write_count(), 1);
}

#[tokio::test]
async fn test_sync_tracks_new_source_version() {
    let store = store_with("project-1", "gsm-token", b"v1");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-token", "ns-a", "secret-a", "key-a");

    assert!(controller.sync(&spec).await.unwrap());

    store.upsert_secret("project-1", "gsm-token", b"v2").await.unwrap();
    assert!(controller.sync(&spec).await.unwrap());

    // round trip: what was written is what is read back
    assert_eq!(
        cluster.get_secret_value("ns-a", "secret-a", "key-a").await.unwrap().as_deref(),
        Some(b"v2".as_slice())
    );
}

#[tokio::test]
async fn test_sync_missing_namespace_is_an_error() {
    let store = store_with("project-1", "gsm-token", b"v1");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-token", "ns-missing", "secret-a", "key-a");

    let err = controller.sync(&spec).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(cluster.write_count(), 0);
}

#[tokio::test]
async fn test_sync_missing_source_is_an_error() {
    let store = Arc::new(InMemorySecretStore::new(&["project-1"]));
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));

    let controller = controller_for(&store, &cluster);
    let spec = sync_spec("project-1", "gsm-token", "ns-a", "secret-a", "key-a");

    assert!(controller.sync(&spec).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_run_once_continues_past_failing_spec() {
    let store = store_with("project-1", "gsm-token", b"v1");
    let cluster = Arc::new(InMemoryClusterSecrets::new(&["ns-a"]));

    let agent = agent_with(Configuration {
        rotation_specs: vec![],
        sync_specs: vec![
            sync_spec("project-1", "gsm-token", "ns-missing", "secret-a", "key-a"),
            sync_spec("project-1", "gsm-token", "ns-a", "secret-a", "key-a"),
        ],
    });
    let controller = SyncController::new(
        store.clone() as Arc<dyn SecretStore>,
        cluster.clone() as Arc<dyn ClusterSecrets>,
        agent,
    );

    controller.run_once().await;

    assert_eq!(
        cluster.get_secret_value("ns-a", "secret-a", "key-a").await.unwrap().as_deref(),
        Some(b"v1".as_slice())
    );
}
