//! Service-account key provisioner
//!
//! Mints and deletes IAM service-account keys. The identifying labels are
//! `project` and `service-account`; the upstream identifier recorded in the
//! secret labels is the short key id. Deletion is gated behind
//! `enable_deletion` so a new deployment can dry-run its first grace-period
//! passes.

use crate::errors::{KeywheelError, Result};
use crate::provision::{ProvisionedCredential, Provisioner};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use google_iam1::api::CreateServiceAccountKeyRequest;
use google_iam1::{hyper_rustls, hyper_util, Iam};

/// The kind tag rotation specs use to select this provisioner.
pub const SERVICE_ACCOUNT_KEY_KIND: &str = "serviceAccountKey";

/// IAM service-account key provisioner.
pub struct ServiceAccountKeyProvisioner {
    hub: Iam<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>,
    /// When false, `deactivate` only logs what it would delete.
    enable_deletion: bool,
}

impl std::fmt::Debug for ServiceAccountKeyProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKeyProvisioner")
            .field("enable_deletion", &self.enable_deletion)
            .field("hub", &"[Iam]")
            .finish()
    }
}

fn account_resource(labels: &HashMap<String, String>) -> Result<String> {
    let project = labels
        .get("project")
        .ok_or_else(|| KeywheelError::provision("missing 'project' label"))?;
    let account = labels
        .get("service-account")
        .ok_or_else(|| KeywheelError::provision("missing 'service-account' label"))?;
    Ok(format!(
        "projects/{}/serviceAccounts/{}@{}.iam.gserviceaccount.com",
        project, account, project
    ))
}

impl ServiceAccountKeyProvisioner {
    /// Create a provisioner with a fresh IAM client.
    pub async fn new(enable_deletion: bool) -> Result<Self> {
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(
                    hyper_rustls::HttpsConnectorBuilder::new()
                        .with_native_roots()
                        .map_err(|e| {
                            KeywheelError::config(format!(
                                "Failed to load native TLS roots: {}",
                                e
                            ))
                        })?
                        .https_or_http()
                        .enable_http2()
                        .build(),
                );

        let key = yup_oauth2::read_service_account_key(
            std::env::var("GOOGLE_APPLICATION_CREDENTIALS").unwrap_or_else(|_| "".to_string()),
        )
        .await
        .map_err(|e| {
            KeywheelError::config(format!(
                "Failed to read IAM credentials. Set GOOGLE_APPLICATION_CREDENTIALS or run \
                 with a service account: {}",
                e
            ))
        })?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| {
                KeywheelError::config(format!("Failed to build authenticator: {}", e))
            })?;

        let hub = Iam::new(client, auth);

        Ok(Self { hub, enable_deletion })
    }
}

#[async_trait]
impl Provisioner for ServiceAccountKeyProvisioner {
    fn kind_tag(&self) -> &'static str {
        SERVICE_ACCOUNT_KEY_KIND
    }

    fn kind_labels(
        &self,
        parameters: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        for required in ["project", "service-account"] {
            if !parameters.contains_key(required) {
                return Err(KeywheelError::provision(format!(
                    "service-account keys need a '{}' kind parameter",
                    required
                )));
            }
        }
        Ok(parameters.clone())
    }

    async fn create_new(
        &self,
        labels: &HashMap<String, String>,
    ) -> Result<ProvisionedCredential> {
        let account = account_resource(labels)?;
        let request = CreateServiceAccountKeyRequest::default();

        let (_, key) = self
            .hub
            .projects()
            .service_accounts_keys_create(request, &account)
            .doit()
            .await
            .map_err(|e| {
                KeywheelError::provision(format!("failed to create key for {}: {}", account, e))
            })?;

        let payload = key.private_key_data.ok_or_else(|| {
            KeywheelError::provision(format!("created key for {} has no private material", account))
        })?;

        let name = key.name.unwrap_or_default();
        let key_id = name.rsplit('/').next().unwrap_or_default().to_string();
        if key_id.is_empty() {
            return Err(KeywheelError::provision(format!(
                "created key for {} has no name",
                account
            )));
        }

        info!(account = %account, key = %key_id, "Provisioned a new service account key");

        Ok(ProvisionedCredential { external_id: key_id, payload })
    }

    async fn deactivate(&self, labels: &HashMap<String, String>, version: &str) -> Result<()> {
        let account = account_resource(labels)?;
        let key_id = labels.get(&format!("v{}", version)).ok_or_else(|| {
            KeywheelError::provision(format!("no key recorded for version {}", version))
        })?;
        let name = format!("{}/keys/{}", account, key_id);

        if self.enable_deletion {
            self.hub
                .projects()
                .service_accounts_keys_delete(&name)
                .doit()
                .await
                .map_err(|e| {
                    KeywheelError::provision(format!("failed to delete key {}: {}", name, e))
                })?;
            info!(version = %version, key = %name, "Deactivated service account key");
        } else {
            info!(version = %version, key = %name, "Deletion disabled, would deactivate key");
        }

        Ok(())
    }
}
