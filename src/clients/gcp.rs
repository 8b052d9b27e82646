//! Google Secret Manager client
//!
//! Implements [`SecretStore`] against the hosted Secret Manager API.
//! Credentials come from `GOOGLE_APPLICATION_CREDENTIALS`; secrets are
//! created with automatic replication; label updates are read-modify-write
//! of the whole map under a `labels` field mask because the API has no
//! per-key operation.

use crate::clients::secret_store::{SecretStore, VersionState};
use crate::errors::{KeywheelError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use google_secretmanager1::api::{
    AddSecretVersionRequest, Automatic, DestroySecretVersionRequest, DisableSecretVersionRequest,
    EnableSecretVersionRequest, Replication, Secret, SecretPayload,
};
use google_secretmanager1::common::FieldMask;
use google_secretmanager1::{hyper_rustls, hyper_util, SecretManager};

/// Secret Manager backed implementation of [`SecretStore`].
pub struct GoogleSecretManager {
    hub: SecretManager<
        hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    >,
}

impl std::fmt::Debug for GoogleSecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSecretManager").field("hub", &"[SecretManager]").finish()
    }
}

fn secret_name(project: &str, id: &str) -> String {
    format!("projects/{}/secrets/{}", project, id)
}

fn version_name(project: &str, id: &str, version: &str) -> String {
    format!("projects/{}/secrets/{}/versions/{}", project, id, version)
}

/// Map an API error onto the crate's error type, detecting NOT_FOUND from
/// the response text.
fn map_api_error<E: std::fmt::Display>(error: E, resource_type: &str, id: &str) -> KeywheelError {
    let text = error.to_string();
    if text.contains("NOT_FOUND") || text.contains("404") {
        KeywheelError::not_found(resource_type, id)
    } else {
        KeywheelError::store(format!("{} '{}': {}", resource_type, id, text))
    }
}

impl GoogleSecretManager {
    /// Create a client authenticated with service-account credentials.
    pub async fn new() -> Result<Self> {
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
                "Failed to read Secret Manager credentials. Set \
                 GOOGLE_APPLICATION_CREDENTIALS or run with a service account: {}",
                e
            ))
        })?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| {
                KeywheelError::config(format!("Failed to build authenticator: {}", e))
            })?;

        let hub = SecretManager::new(client, auth);

        info!("Initialized Secret Manager client");

        Ok(Self { hub })
    }

    async fn get_version(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<google_secretmanager1::api::SecretVersion> {
        let name = version_name(project, id, version);
        let (_, result) = self
            .hub
            .projects()
            .secrets_versions_get(&name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret version", &name))?;
        Ok(result)
    }

    /// Write the whole label map back under a `labels` field mask.
    async fn put_labels(
        &self,
        project: &str,
        id: &str,
        labels: HashMap<String, String>,
    ) -> Result<()> {
        let name = secret_name(project, id);
        let secret = Secret { labels: Some(labels), ..Default::default() };
        self.hub
            .projects()
            .secrets_patch(secret, &name)
            .update_mask(FieldMask::new(&["labels"]))
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret", &name))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for GoogleSecretManager {
    async fn validate_secret(&self, project: &str, id: &str) -> Result<()> {
        let name = secret_name(project, id);
        self.hub
            .projects()
            .secrets_get(&name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret", &name))?;
        Ok(())
    }

    async fn validate_secret_version(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<()> {
        self.get_version(project, id, version).await.map(|_| ())
    }

    async fn upsert_secret(&self, project: &str, id: &str, data: &[u8]) -> Result<String> {
        let parent = format!("projects/{}", project);

        match self.validate_secret(project, id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                let secret = Secret {
                    replication: Some(Replication {
                        automatic: Some(Automatic::default()),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                self.hub
                    .projects()
                    .secrets_create(secret, &parent)
                    .secret_id(id)
                    .doit()
                    .await
                    .map_err(|e| map_api_error(e, "secret", &secret_name(project, id)))?;
                debug!(secret = %secret_name(project, id), "created secret");
            }
            Err(e) => return Err(e),
        }

        let request = AddSecretVersionRequest {
            payload: Some(SecretPayload { data: Some(data.to_vec()), ..Default::default() }),
        };
        let (_, version) = self
            .hub
            .projects()
            .secrets_add_version(request, &secret_name(project, id))
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret", &secret_name(project, id)))?;

        // keep only the trailing version number; '/' is not allowed in labels
        let name = version.name.unwrap_or_default();
        let number = name.rsplit('/').next().unwrap_or_default().to_string();
        if number.is_empty() {
            return Err(KeywheelError::store(format!(
                "added version of '{}' has no name",
                secret_name(project, id)
            )));
        }
        Ok(number)
    }

    async fn get_create_time(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<DateTime<Utc>> {
        let result = self.get_version(project, id, version).await?;
        result.create_time.ok_or_else(|| {
            KeywheelError::store(format!(
                "secret version '{}' has no create time",
                version_name(project, id, version)
            ))
        })
    }

    async fn get_secret_labels(
        &self,
        project: &str,
        id: &str,
    ) -> Result<HashMap<String, String>> {
        let name = secret_name(project, id);
        let (_, secret) = self
            .hub
            .projects()
            .secrets_get(&name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret", &name))?;
        Ok(secret.labels.unwrap_or_default())
    }

    async fn access_secret_version(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<Vec<u8>> {
        let name = version_name(project, id, version);
        let (_, response) = self
            .hub
            .projects()
            .secrets_versions_access(&name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret version", &name))?;

        response
            .payload
            .and_then(|p| p.data)
            .ok_or_else(|| KeywheelError::store(format!("secret version '{}' has no payload", name)))
    }

    async fn get_secret_version_state(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<VersionState> {
        let result = self.get_version(project, id, version).await?;
        let state = result.state.unwrap_or_default();
        state.parse().map_err(|_| {
            KeywheelError::store(format!(
                "secret version '{}' has unexpected state '{}'",
                version_name(project, id, version),
                state
            ))
        })
    }

    async fn enable_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()> {
        let name = version_name(project, id, version);
        self.hub
            .projects()
            .secrets_versions_enable(EnableSecretVersionRequest::default(), &name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret version", &name))?;
        Ok(())
    }

    async fn disable_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()> {
        let name = version_name(project, id, version);
        self.hub
            .projects()
            .secrets_versions_disable(DisableSecretVersionRequest::default(), &name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret version", &name))?;
        Ok(())
    }

    async fn destroy_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()> {
        let name = version_name(project, id, version);
        self.hub
            .projects()
            .secrets_versions_destroy(DestroySecretVersionRequest::default(), &name)
            .doit()
            .await
            .map_err(|e| map_api_error(e, "secret version", &name))?;
        Ok(())
    }

    async fn upsert_secret_label(
        &self,
        project: &str,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut labels = self.get_secret_labels(project, id).await?;
        labels.insert(key.to_string(), value.to_string());
        self.put_labels(project, id, labels).await
    }

    async fn delete_secret_label(&self, project: &str, id: &str, key: &str) -> Result<()> {
        let mut labels = self.get_secret_labels(project, id).await?;
        labels.remove(key);
        self.put_labels(project, id, labels).await
    }
}
