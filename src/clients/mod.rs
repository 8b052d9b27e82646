//! # Remote Clients
//!
//! The two capability traits the controllers consume ([`SecretStore`],
//! [`ClusterSecrets`]), their hosted implementations ([`gcp`], [`kube`]),
//! and deterministic in-memory implementations ([`memory`]) for tests and
//! local runs.

pub mod cluster;
pub mod gcp;
pub mod kube;
pub mod memory;
pub mod secret_store;

pub use cluster::ClusterSecrets;
pub use gcp::GoogleSecretManager;
pub use kube::KubeClusterClient;
pub use memory::{InMemoryClusterSecrets, InMemorySecretStore};
pub use secret_store::{SecretStore, VersionState, LATEST_VERSION};
