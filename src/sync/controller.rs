//! Sync controller
//!
//! One pass of the sync reconciler: for every sync spec, compare the latest
//! bytes of the source Secret Manager secret with the destination cluster
//! key and write through when they differ. Repeated passes with unchanged
//! inputs issue no writes.

use crate::clients::cluster::ClusterSecrets;
use crate::clients::secret_store::{SecretStore, LATEST_VERSION};
use crate::config::{ConfigAgent, SyncSpec};
use crate::errors::Result;
use crate::scheduler::Reconciler;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// The sync reconciler.
pub struct SyncController {
    store: Arc<dyn SecretStore>,
    cluster: Arc<dyn ClusterSecrets>,
    agent: Arc<ConfigAgent>,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn SecretStore>,
        cluster: Arc<dyn ClusterSecrets>,
        agent: Arc<ConfigAgent>,
    ) -> Self {
        Self { store, cluster, agent }
    }

    /// Run one sync pass over every spec in the current snapshot. Per-spec
    /// failures are logged and the pass continues.
    pub async fn run_once(&self) {
        let config = self.agent.snapshot();

        for spec in &config.sync_specs {
            match self.sync(spec).await {
                Ok(true) => {
                    info!(destination = %spec.destination, source = %spec.source, "secret synced")
                }
                Ok(false) => {}
                Err(e) => error!(spec = %spec, error = %e, "secret sync failed"),
            }
        }
    }

    /// Synchronize one spec. Returns whether the destination was updated.
    ///
    /// The destination read yields `None` when the secret or the key does
    /// not exist yet; a missing namespace is a hard error for this spec.
    pub async fn sync(&self, spec: &SyncSpec) -> Result<bool> {
        let source_data = self
            .store
            .access_secret_version(&spec.source.project, &spec.source.secret, LATEST_VERSION)
            .await?;

        let destination_data = self
            .cluster
            .get_secret_value(
                &spec.destination.namespace,
                &spec.destination.secret,
                &spec.destination.key,
            )
            .await?;

        if destination_data.as_deref() == Some(source_data.as_slice()) {
            return Ok(false);
        }

        self.cluster
            .upsert_secret(
                &spec.destination.namespace,
                &spec.destination.secret,
                &spec.destination.key,
                &source_data,
            )
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl Reconciler for SyncController {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn reconcile(&self) {
        self.run_once().await;
    }
}
