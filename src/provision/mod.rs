//! # Credential Provisioners
//!
//! A provisioner mints and revokes upstream credentials of one kind. The
//! registry maps the `kind` tag of a rotation spec to its provisioner; the
//! set of kinds is open, new kinds register under their tag.

pub mod service_account_key;

use crate::errors::{KeywheelError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

pub use service_account_key::ServiceAccountKeyProvisioner;

/// A freshly minted credential: the upstream identifier needed to revoke it
/// later, and the bytes to publish as the new secret version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedCredential {
    pub external_id: String,
    pub payload: Vec<u8>,
}

/// Trait for credential provisioners.
///
/// Implementations are stateless with respect to the rotation bookkeeping:
/// everything they need to act arrives in the label map, including the
/// `v<N>` entries recording upstream identifiers.
#[async_trait]
pub trait Provisioner: Send + Sync + std::fmt::Debug {
    /// The tag this provisioner registers under (the spec's `kind` field).
    fn kind_tag(&self) -> &'static str;

    /// The identifying label pairs that must be present on the remote secret
    /// for provisioning to work, derived from the spec's `kindParameters`.
    fn kind_labels(
        &self,
        parameters: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>>;

    /// Mint a new credential.
    async fn create_new(
        &self,
        labels: &HashMap<String, String>,
    ) -> Result<ProvisionedCredential>;

    /// Revoke the credential recorded under label `v<version>`. Must be
    /// idempotent: the upstream may already have deleted it.
    async fn deactivate(&self, labels: &HashMap<String, String>, version: &str) -> Result<()>;
}

/// Registry of provisioners keyed by kind tag.
#[derive(Debug, Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<String, Arc<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self { provisioners: HashMap::new() }
    }

    /// Register a provisioner under its kind tag. A second registration for
    /// the same tag replaces the first.
    pub fn register(&mut self, provisioner: Arc<dyn Provisioner>) {
        let tag = provisioner.kind_tag();
        info!(kind = %tag, "Registering credential provisioner");
        self.provisioners.insert(tag.to_string(), provisioner);
    }

    /// Look up the provisioner for a kind tag.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn Provisioner>> {
        self.provisioners
            .get(kind)
            .cloned()
            .ok_or_else(|| {
                KeywheelError::provision(format!("no provisioner registered for kind '{}'", kind))
            })
    }

    pub fn has(&self, kind: &str) -> bool {
        self.provisioners.contains_key(kind)
    }

    /// The set of registered kind tags, for configuration validation.
    pub fn kind_tags(&self) -> HashSet<String> {
        self.provisioners.keys().cloned().collect()
    }
}

/// The kind tags this build knows how to provision. Processes that validate
/// configuration without constructing provisioners (the sync controller)
/// use this set.
pub fn known_kind_tags() -> HashSet<String> {
    [service_account_key::SERVICE_ACCOUNT_KEY_KIND.to_string()].into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NullProvisioner;

    #[async_trait]
    impl Provisioner for NullProvisioner {
        fn kind_tag(&self) -> &'static str {
            "null"
        }

        fn kind_labels(
            &self,
            parameters: &HashMap<String, String>,
        ) -> Result<HashMap<String, String>> {
            Ok(parameters.clone())
        }

        async fn create_new(
            &self,
            _labels: &HashMap<String, String>,
        ) -> Result<ProvisionedCredential> {
            Ok(ProvisionedCredential { external_id: "id".to_string(), payload: b"data".to_vec() })
        }

        async fn deactivate(
            &self,
            _labels: &HashMap<String, String>,
            _version: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProvisionerRegistry::new();
        assert!(!registry.has("null"));
        assert!(registry.get("null").is_err());

        registry.register(Arc::new(NullProvisioner));
        assert!(registry.has("null"));
        assert!(registry.get("null").is_ok());
        assert!(registry.kind_tags().contains("null"));
    }
}
