//! Cluster secrets trait
//!
//! The capability set the sync controller requires from the cluster API:
//! namespaced Secret objects holding a key-to-bytes map, plus namespace
//! existence checks. The controller never lists or enumerates; it reads,
//! patches, or creates one object at a time.

use crate::errors::Result;
use async_trait::async_trait;

/// Trait for the cluster secrets API.
#[async_trait]
pub trait ClusterSecrets: Send + Sync {
    /// Ok if the namespace exists, `NotFound` otherwise.
    async fn validate_namespace(&self, namespace: &str) -> Result<()>;

    /// Ok if the secret exists under the namespace, `NotFound` otherwise.
    async fn validate_secret(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a namespace.
    async fn create_namespace(&self, namespace: &str) -> Result<()>;

    /// The value under `key`. `None` when the secret or the key is absent
    /// but the namespace exists; a missing namespace is an error.
    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Set `key` to `data`, creating the secret if it does not exist and
    /// patching the single key otherwise. Other keys are preserved.
    async fn upsert_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        data: &[u8],
    ) -> Result<()>;
}
