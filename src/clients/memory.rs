//! In-memory client implementations
//!
//! Deterministic implementations of both client traits, backing the
//! integration tests and usable as a local stand-in for the hosted services.
//! Versions are integer-keyed with `latest` resolving to the highest number;
//! a project (or namespace) must exist before secrets can be written under
//! it.

use crate::clients::cluster::ClusterSecrets;
use crate::clients::secret_store::{SecretStore, VersionState, LATEST_VERSION};
use crate::errors::{KeywheelError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredVersion {
    create_time: DateTime<Utc>,
    data: Vec<u8>,
    state: VersionState,
}

#[derive(Debug, Clone, Default)]
struct StoredSecret {
    versions: HashMap<u64, StoredVersion>,
    labels: HashMap<String, String>,
}

/// In-memory [`SecretStore`].
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    // project -> secret id -> secret
    secrets: Mutex<HashMap<String, HashMap<String, StoredSecret>>>,
}

impl InMemorySecretStore {
    /// Create a store with the given projects pre-provisioned.
    pub fn new<S: AsRef<str>>(projects: &[S]) -> Self {
        let secrets = projects
            .iter()
            .map(|p| (p.as_ref().to_string(), HashMap::new()))
            .collect();
        Self { secrets: Mutex::new(secrets) }
    }

    /// Create an empty secret (no versions, no labels).
    pub fn add_secret(&self, project: &str, id: &str) {
        let mut secrets = self.lock();
        secrets
            .entry(project.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
    }

    /// Insert a version with an explicit creation time and state.
    pub fn add_version(
        &self,
        project: &str,
        id: &str,
        version: u64,
        create_time: DateTime<Utc>,
        data: &[u8],
        state: VersionState,
    ) {
        let mut secrets = self.lock();
        secrets
            .entry(project.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .versions
            .insert(version, StoredVersion { create_time, data: data.to_vec(), state });
    }

    /// Set a label directly, bypassing validation.
    pub fn set_label(&self, project: &str, id: &str, key: &str, value: &str) {
        let mut secrets = self.lock();
        secrets
            .entry(project.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .labels
            .insert(key.to_string(), value.to_string());
    }

    /// Number of versions currently stored for a secret (0 if absent).
    pub fn version_count(&self, project: &str, id: &str) -> usize {
        self.lock()
            .get(project)
            .and_then(|p| p.get(id))
            .map(|s| s.versions.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, StoredSecret>>> {
        self.secrets.lock().expect("secret store lock poisoned")
    }

    fn resolve_version(secret: &StoredSecret, version: &str) -> Result<u64> {
        if version == LATEST_VERSION {
            return secret
                .versions
                .keys()
                .max()
                .copied()
                .ok_or_else(|| KeywheelError::not_found("secret version", LATEST_VERSION));
        }
        version
            .parse::<u64>()
            .map_err(|_| KeywheelError::store(format!("malformed version '{}'", version)))
    }

    fn with_version<T>(
        &self,
        project: &str,
        id: &str,
        version: &str,
        f: impl FnOnce(&mut StoredVersion) -> T,
    ) -> Result<T> {
        let mut secrets = self.lock();
        let secret = secrets
            .get_mut(project)
            .and_then(|p| p.get_mut(id))
            .ok_or_else(|| {
                KeywheelError::not_found("secret", format!("projects/{}/secrets/{}", project, id))
            })?;
        let number = Self::resolve_version(secret, version)?;
        let stored = secret.versions.get_mut(&number).ok_or_else(|| {
            KeywheelError::not_found(
                "secret version",
                format!("projects/{}/secrets/{}/versions/{}", project, id, number),
            )
        })?;
        Ok(f(stored))
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn validate_secret(&self, project: &str, id: &str) -> Result<()> {
        let secrets = self.lock();
        secrets
            .get(project)
            .and_then(|p| p.get(id))
            .map(|_| ())
            .ok_or_else(|| {
                KeywheelError::not_found("secret", format!("projects/{}/secrets/{}", project, id))
            })
    }

    async fn validate_secret_version(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<()> {
        self.with_version(project, id, version, |_| ())
    }

    async fn upsert_secret(&self, project: &str, id: &str, data: &[u8]) -> Result<String> {
        let mut secrets = self.lock();
        let project_secrets = secrets.get_mut(project).ok_or_else(|| {
            KeywheelError::not_found("project", format!("projects/{}", project))
        })?;
        let secret = project_secrets.entry(id.to_string()).or_default();
        let next = secret.versions.keys().max().copied().unwrap_or(0) + 1;
        secret.versions.insert(
            next,
            StoredVersion {
                create_time: Utc::now(),
                data: data.to_vec(),
                state: VersionState::Enabled,
            },
        );
        Ok(next.to_string())
    }

    async fn get_create_time(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<DateTime<Utc>> {
        self.with_version(project, id, version, |v| v.create_time)
    }

    async fn get_secret_labels(
        &self,
        project: &str,
        id: &str,
    ) -> Result<HashMap<String, String>> {
        let secrets = self.lock();
        secrets
            .get(project)
            .and_then(|p| p.get(id))
            .map(|s| s.labels.clone())
            .ok_or_else(|| {
                KeywheelError::not_found("secret", format!("projects/{}/secrets/{}", project, id))
            })
    }

    async fn access_secret_version(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<Vec<u8>> {
        self.with_version(project, id, version, |v| v.data.clone())
    }

    async fn get_secret_version_state(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<VersionState> {
        self.with_version(project, id, version, |v| v.state)
    }

    async fn enable_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()> {
        self.with_version(project, id, version, |v| v.state = VersionState::Enabled)
    }

    async fn disable_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()> {
        self.with_version(project, id, version, |v| v.state = VersionState::Disabled)
    }

    async fn destroy_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()> {
        self.with_version(project, id, version, |v| {
            v.state = VersionState::Destroyed;
            v.data.clear();
        })
        
    }

    async fn upsert_secret_label(
        &self,
        project: &str,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut secrets = self.lock();
        let secret = secrets
            .get_mut(project)
            .and_then(|p| p.get_mut(id))
            .ok_or_else(|| {
                KeywheelError::not_found("secret", format!("projects/{}/secrets/{}", project, id))
            })?;
        secret.labels.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_secret_label(&self, project: &str, id: &str, key: &str) -> Result<()> {
        let mut secrets = self.lock();
        let secret = secrets
            .get_mut(project)
            .and_then(|p| p.get_mut(id))
            .ok_or_else(|| {
                KeywheelError::not_found("secret", format!("projects/{}/secrets/{}", project, id))
            })?;
        secret.labels.remove(key);
        Ok(())
    }
}

/// In-memory [`ClusterSecrets`], with a write counter the sync tests use to
/// verify idempotence.
#[derive(Debug, Default)]
pub struct InMemoryClusterSecrets {
    // namespace -> secret name -> key -> bytes
    namespaces: Mutex<HashMap<String, HashMap<String, HashMap<String, Vec<u8>>>>>,
    writes: AtomicUsize,
}

impl InMemoryClusterSecrets {
    /// Create a cluster with the given namespaces pre-provisioned.
    pub fn new<S: AsRef<str>>(namespaces: &[S]) -> Self {
        let namespaces = namespaces
            .iter()
            .map(|ns| (ns.as_ref().to_string(), HashMap::new()))
            .collect();
        Self { namespaces: Mutex::new(namespaces), writes: AtomicUsize::new(0) }
    }

    /// Set a key directly, bypassing validation and the write counter.
    pub fn set_value(&self, namespace: &str, name: &str, key: &str, data: &[u8]) {
        let mut namespaces = self.lock();
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    /// Number of writes issued through `upsert_secret`.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, HashMap<String, Vec<u8>>>>>
    {
        self.namespaces.lock().expect("cluster lock poisoned")
    }
}

#[async_trait]
impl ClusterSecrets for InMemoryClusterSecrets {
    async fn validate_namespace(&self, namespace: &str) -> Result<()> {
        self.lock()
            .get(namespace)
            .map(|_| ())
            .ok_or_else(|| KeywheelError::not_found("namespace", namespace))
    }

    async fn validate_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.lock()
            .get(namespace)
            .ok_or_else(|| KeywheelError::not_found("namespace", namespace))?
            .get(name)
            .map(|_| ())
            .ok_or_else(|| {
                KeywheelError::not_found(
                    "secret",
                    format!("namespaces/{}/secrets/{}", namespace, name),
                )
            })
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        self.lock().entry(namespace.to_string()).or_default();
        Ok(())
    }

    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let namespaces = self.lock();
        let secrets = namespaces
            .get(namespace)
            .ok_or_else(|| KeywheelError::not_found("namespace", namespace))?;
        Ok(secrets.get(name).and_then(|s| s.get(key)).cloned())
    }

    async fn upsert_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        data: &[u8],
    ) -> Result<()> {
        let mut namespaces = self.lock();
        let secrets = namespaces
            .get_mut(namespace)
            .ok_or_else(|| KeywheelError::not_found("namespace", namespace))?;
        secrets
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_latest_resolves_to_highest_version() {
        let store = InMemorySecretStore::new(&["project-1"]);
        store.add_version(
            "project-1",
            "secret-1",
            1,
            time("2000-01-01T00:00:00Z"),
            b"one",
            VersionState::Enabled,
        );
        store.add_version(
            "project-1",
            "secret-1",
            2,
            time("2000-01-01T07:00:00Z"),
            b"two",
            VersionState::Enabled,
        );

        let data = store.access_secret_version("project-1", "secret-1", "latest").await.unwrap();
        assert_eq!(data, b"two");
    }

    #[tokio::test]
    async fn test_upsert_appends_version() {
        let store = InMemorySecretStore::new(&["project-1"]);
        assert_eq!(store.upsert_secret("project-1", "secret-1", b"v1").await.unwrap(), "1");
        assert_eq!(store.upsert_secret("project-1", "secret-1", b"v2").await.unwrap(), "2");
        assert_eq!(store.version_count("project-1", "secret-1"), 2);
    }

    #[tokio::test]
    async fn test_upsert_requires_project() {
        let store = InMemorySecretStore::new(&["project-1"]);
        let err = store.upsert_secret("missing", "secret-1", b"v1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_version_is_not_found() {
        let store = InMemorySecretStore::new(&["project-1"]);
        store.add_secret("project-1", "secret-1");
        let err =
            store.validate_secret_version("project-1", "secret-1", "3").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_destroy_clears_data() {
        let store = InMemorySecretStore::new(&["project-1"]);
        store.add_version(
            "project-1",
            "secret-1",
            1,
            time("2000-01-01T00:00:00Z"),
            b"payload",
            VersionState::Enabled,
        );
        store.destroy_secret_version("project-1", "secret-1", "1").await.unwrap();
        assert_eq!(
            store.get_secret_version_state("project-1", "secret-1", "1").await.unwrap(),
            VersionState::Destroyed
        );
    }

    #[tokio::test]
    async fn test_labels_read_modify_write() {
        let store = InMemorySecretStore::new(&["project-1"]);
        store.add_secret("project-1", "secret-1");
        store.upsert_secret_label("project-1", "secret-1", "v1", "key_id-1").await.unwrap();
        store.upsert_secret_label("project-1", "secret-1", "project", "project-1").await.unwrap();
        store.delete_secret_label("project-1", "secret-1", "v1").await.unwrap();

        let labels = store.get_secret_labels("project-1", "secret-1").await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("project").map(String::as_str), Some("project-1"));
    }

    #[tokio::test]
    async fn test_cluster_value_semantics() {
        let cluster = InMemoryClusterSecrets::new(&["ns-a"]);

        // missing namespace is an error
        assert!(cluster.get_secret_value("ns-b", "secret-a", "key-a").await.is_err());
        // missing secret and missing key are None
        assert_eq!(cluster.get_secret_value("ns-a", "secret-a", "key-a").await.unwrap(), None);
        cluster.set_value("ns-a", "secret-a", "key-a", b"value");
        assert_eq!(cluster.get_secret_value("ns-a", "secret-a", "other").await.unwrap(), None);
        assert_eq!(
            cluster.get_secret_value("ns-a", "secret-a", "key-a").await.unwrap().as_deref(),
            Some(b"value".as_slice())
        );
    }

    #[tokio::test]
    async fn test_cluster_upsert_counts_writes() {
        let cluster = InMemoryClusterSecrets::new(&["ns-a"]);
        cluster.upsert_secret("ns-a", "secret-a", "key-a", b"value").await.unwrap();
        assert_eq!(cluster.write_count(), 1);
        assert!(cluster.validate_secret("ns-a", "secret-a").await.is_ok());
    }
}
