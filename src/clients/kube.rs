//! Kubernetes cluster client
//!
//! Implements [`ClusterSecrets`] with the `kube` client: in-cluster
//! configuration when available, an explicit kubeconfig path otherwise.
//! Upserts patch a single key of the Secret's `data` map so sibling keys
//! survive, and create the Secret when the patch target does not exist.

use crate::clients::cluster::ClusterSecrets;
use crate::errors::{KeywheelError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Kubernetes implementation of [`ClusterSecrets`].
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish()
    }
}

fn map_kube_error(error: kube::Error, resource_type: &str, id: &str) -> KeywheelError {
    if let kube::Error::Api(response) = &error {
        if response.code == 404 {
            return KeywheelError::not_found(resource_type, id);
        }
    }
    KeywheelError::cluster_with_source(
        format!("{} '{}'", resource_type, id),
        Box::new(error),
    )
}

impl KubeClusterClient {
    /// Create a client from the in-cluster environment, or from a kubeconfig
    /// file when a path is given.
    pub async fn new(kubeconfig: Option<&str>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    KeywheelError::config_with_source(
                        format!("failed to read kubeconfig {}", path),
                        Box::new(e),
                    )
                })?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| {
                            KeywheelError::config_with_source(
                                format!("invalid kubeconfig {}", path),
                                Box::new(e),
                            )
                        })?;
                Client::try_from(config).map_err(|e| {
                    KeywheelError::cluster_with_source(
                        "failed to create cluster client",
                        Box::new(e),
                    )
                })?
            }
            None => Client::try_default().await.map_err(|e| {
                KeywheelError::cluster_with_source(
                    "failed to create cluster client",
                    Box::new(e),
                )
            })?,
        };

        info!("Initialized cluster client");

        Ok(Self { client })
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterSecrets for KubeClusterClient {
    async fn validate_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces()
            .get(namespace)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, "namespace", namespace))
    }

    async fn validate_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets(namespace)
            .get(name)
            .await
            .map(|_| ())
            .map_err(|e| {
                map_kube_error(e, "secret", &format!("namespaces/{}/secrets/{}", namespace, name))
            })
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        let object = Namespace {
            metadata: ObjectMeta { name: Some(namespace.to_string()), ..Default::default() },
            ..Default::default()
        };
        self.namespaces()
            .create(&PostParams::default(), &object)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, "namespace", namespace))
    }

    async fn get_secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.validate_namespace(namespace).await?;

        let secret = match self.secrets(namespace).get(name).await {
            Ok(secret) => secret,
            Err(e) => {
                let mapped = map_kube_error(
                    e,
                    "secret",
                    &format!("namespaces/{}/secrets/{}", namespace, name),
                );
                if mapped.is_not_found() {
                    return Ok(None);
                }
                return Err(mapped);
            }
        };

        Ok(secret.data.and_then(|data| data.get(key).map(|v| v.0.clone())))
    }

    async fn upsert_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        data: &[u8],
    ) -> Result<()> {
        self.validate_namespace(namespace).await?;

        let patch = serde_json::json!({
            "data": { key: STANDARD.encode(data) }
        });

        match self
            .secrets(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(namespace = %namespace, secret = %name, key = %key, "patched secret key");
                Ok(())
            }
            Err(e) => {
                let mapped = map_kube_error(
                    e,
                    "secret",
                    &format!("namespaces/{}/secrets/{}", namespace, name),
                );
                if !mapped.is_not_found() {
                    return Err(mapped);
                }

                // patch target absent, create the secret with the single key
                let object = Secret {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    data: Some(BTreeMap::from([(
                        key.to_string(),
                        ByteString(data.to_vec()),
                    )])),
                    ..Default::default()
                };
                self.secrets(namespace)
                    .create(&PostParams::default(), &object)
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        map_kube_error(
                            e,
                            "secret",
                            &format!("namespaces/{}/secrets/{}", namespace, name),
                        )
                    })?;
                debug!(namespace = %namespace, secret = %name, key = %key, "created secret");
                Ok(())
            }
        }
    }
}
