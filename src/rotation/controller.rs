//! Rotation controller
//!
//! One pass of the rotation reconciler for every rotation spec in the
//! current snapshot. Per spec and in order: upsert identifying labels,
//! refresh, deactivate. Any failure is logged with the spec identifier and
//! never stops the other specs.
//!
//! The only durable state beyond the versions themselves is the secret's
//! label map: identifying labels from the spec's kind parameters, plus one
//! `v<N>` label per live version holding the upstream credential id needed
//! to revoke it.

use crate::clients::secret_store::{SecretStore, LATEST_VERSION};
use crate::config::{ConfigAgent, RotationSpec};
use crate::errors::{KeywheelError, Result};
use crate::provision::ProvisionerRegistry;
use crate::scheduler::Reconciler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Label keys carrying version-to-credential mappings. The `v` prefix is
/// required because labels must begin with a lowercase letter.
static VERSION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v[0-9]+$").expect("static pattern"));

/// The rotation reconciler.
pub struct RotationController {
    store: Arc<dyn SecretStore>,
    agent: Arc<ConfigAgent>,
    provisioners: Arc<ProvisionerRegistry>,
}

impl RotationController {
    pub fn new(
        store: Arc<dyn SecretStore>,
        agent: Arc<ConfigAgent>,
        provisioners: Arc<ProvisionerRegistry>,
    ) -> Self {
        Self { store, agent, provisioners }
    }

    /// Run one rotation pass over every spec in the current snapshot.
    pub async fn run_once(&self) {
        let config = self.agent.snapshot();
        let queued = self.agent.queued_refreshes();

        for spec in &config.rotation_specs {
            if let Err(e) = self.upsert_kind_labels(spec).await {
                error!(spec = %spec, error = %e, "failed to update identifying labels");
            }

            match self.refresh(spec, Utc::now(), &queued).await {
                Ok(true) => info!(spec = %spec, "secret refreshed"),
                Ok(false) => {}
                Err(e) => error!(spec = %spec, error = %e, "failed to refresh secret"),
            }

            if let Err(e) = self.deactivate(spec, Utc::now()).await {
                error!(spec = %spec, error = %e, "failed to deactivate old versions");
            }
        }
    }

    /// Write any identifying label that is absent or different on the stored
    /// secret. The secret must already exist; nothing is created here.
    async fn upsert_kind_labels(&self, spec: &RotationSpec) -> Result<()> {
        let provisioner = self.provisioners.get(&spec.kind)?;
        let kind_labels = provisioner.kind_labels(&spec.kind_parameters)?;
        let current = self.store.get_secret_labels(&spec.project, &spec.secret).await?;

        for (key, value) in &kind_labels {
            if current.get(key) != Some(value) {
                self.store
                    .upsert_secret_label(&spec.project, &spec.secret, key, value)
                    .await?;
            }
        }
        Ok(())
    }

    /// Whether the spec needs a refresh at `now`: version 1 does not exist
    /// yet (bootstrap), the interval elapsed since the latest version was
    /// created, or the cron scheduler queued this spec since the last poll.
    pub async fn should_refresh(
        &self,
        spec: &RotationSpec,
        now: DateTime<Utc>,
        queued: &HashSet<String>,
    ) -> Result<bool> {
        match self.store.validate_secret_version(&spec.project, &spec.secret, "1").await {
            Err(e) if e.is_not_found() => return Ok(true),
            Err(e) => return Err(e),
            Ok(()) => {}
        }

        if let Some(interval) = spec.refresh.interval {
            let created = self
                .store
                .get_create_time(&spec.project, &spec.secret, LATEST_VERSION)
                .await?;
            let interval = chrono::Duration::from_std(interval).map_err(|_| {
                KeywheelError::internal(format!("interval out of range for {}", spec))
            })?;
            return Ok(now > created + interval);
        }

        Ok(queued.contains(&spec.id()))
    }

    /// Provision a new credential and publish it as a new secret version,
    /// recording `v<version> -> external id` in the labels. Returns whether
    /// a refresh happened.
    pub async fn refresh(
        &self,
        spec: &RotationSpec,
        now: DateTime<Utc>,
        queued: &HashSet<String>,
    ) -> Result<bool> {
        if !self.should_refresh(spec, now, queued).await? {
            return Ok(false);
        }

        let provisioner = self.provisioners.get(&spec.kind)?;
        let kind_labels = provisioner.kind_labels(&spec.kind_parameters)?;
        let mut labels = self.store.get_secret_labels(&spec.project, &spec.secret).await?;
        for (key, value) in kind_labels {
            labels.insert(key, value);
        }

        let credential = provisioner.create_new(&labels).await?;

        let version = self
            .store
            .upsert_secret(&spec.project, &spec.secret, &credential.payload)
            .await?;
        self.store
            .upsert_secret_label(
                &spec.project,
                &spec.secret,
                &format!("v{}", version),
                &credential.external_id,
            )
            .await?;

        info!(spec = %spec, version = %version, "published new secret version");
        Ok(true)
    }

    /// Walk the `v<N>` labels and retire every version whose grace period
    /// expired. Versions are processed independently; a per-version failure
    /// is logged and skipped.
    pub async fn deactivate(&self, spec: &RotationSpec, now: DateTime<Utc>) -> Result<()> {
        let provisioner = self.provisioners.get(&spec.kind)?;
        let kind_labels = provisioner.kind_labels(&spec.kind_parameters)?;
        let mut labels = self.store.get_secret_labels(&spec.project, &spec.secret).await?;
        for (key, value) in kind_labels {
            labels.insert(key, value);
        }

        let mut versions: Vec<u64> = labels
            .keys()
            .filter(|key| VERSION_LABEL.is_match(key))
            .filter_map(|key| key[1..].parse().ok())
            .collect();
        versions.sort_unstable();

        for version in versions {
            if let Err(e) = self.deactivate_version(spec, &labels, version, now).await {
                warn!(spec = %spec, version = version, error = %e, "skipping version");
            }
        }
        Ok(())
    }

    async fn deactivate_version(
        &self,
        spec: &RotationSpec,
        labels: &HashMap<String, String>,
        version: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.should_deactivate(spec, version, now).await? {
            return Ok(());
        }

        let provisioner = self.provisioners.get(&spec.kind)?;
        let version_str = version.to_string();

        // upstream revocation first, then store state, then label removal
        provisioner.deactivate(labels, &version_str).await?;
        self.store
            .destroy_secret_version(&spec.project, &spec.secret, &version_str)
            .await?;
        self.store
            .delete_secret_label(&spec.project, &spec.secret, &format!("v{}", version))
            .await?;

        info!(spec = %spec, version = version, "destroyed superseded version");
        Ok(())
    }

    /// A version may be deactivated once its successor exists and the grace
    /// period measured from the successor's creation has strictly passed.
    /// The latest version (no successor) is always retained.
    pub async fn should_deactivate(
        &self,
        spec: &RotationSpec,
        version: u64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let current = version.to_string();
        let next = (version + 1).to_string();

        self.store.validate_secret_version(&spec.project, &spec.secret, &current).await?;

        match self.store.validate_secret_version(&spec.project, &spec.secret, &next).await {
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
            Ok(()) => {}
        }

        let next_created =
            self.store.get_create_time(&spec.project, &spec.secret, &next).await?;
        let grace = chrono::Duration::from_std(spec.grace_period).map_err(|_| {
            KeywheelError::internal(format!("grace period out of range for {}", spec))
        })?;

        Ok(now > next_created + grace)
    }
}

#[async_trait]
impl Reconciler for RotationController {
    fn name(&self) -> &'static str {
        "rotation"
    }

    async fn reconcile(&self) {
        self.run_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_label_pattern() {
        for key in ["v1", "v42", "v007"] {
            assert!(VERSION_LABEL.is_match(key), "{} should match", key);
        }
        for key in ["v", "v1a", "x1", "V1", "1", "service-account", "vv2"] {
            assert!(!VERSION_LABEL.is_match(key), "{} should not match", key);
        }
    }
}
