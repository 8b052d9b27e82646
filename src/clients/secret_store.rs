//! Secret store trait and types
//!
//! The capability set the controllers require from the remote secret store:
//! named secrets under a project, append-only integer versions with a
//! `latest` alias, per-version state, and a mutable label map the rotator
//! uses as its only durable metadata.

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Version alias resolving to the highest existing version number.
pub const LATEST_VERSION: &str = "latest";

/// State of a secret version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionState {
    Enabled,
    Disabled,
    Destroyed,
}

impl VersionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Destroyed => "DESTROYED",
        }
    }
}

impl FromStr for VersionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ENABLED" => Ok(Self::Enabled),
            "DISABLED" => Ok(Self::Disabled),
            "DESTROYED" => Ok(Self::Destroyed),
            _ => Err(format!("Unknown secret version state: {}", s)),
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for remote secret stores.
///
/// `version` arguments accept either a decimal version number or
/// [`LATEST_VERSION`]. Absence of a secret or version surfaces as a
/// `NotFound` error; the rotation algorithm inspects it with
/// `is_not_found()`.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Ok if the secret exists, `NotFound` otherwise.
    async fn validate_secret(&self, project: &str, id: &str) -> Result<()>;

    /// Ok if the secret version exists, `NotFound` otherwise.
    async fn validate_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()>;

    /// Append a new version carrying `data`, creating the secret (with
    /// automatic replication) if it does not exist yet. Returns the new
    /// version number as a decimal string.
    async fn upsert_secret(&self, project: &str, id: &str, data: &[u8]) -> Result<String>;

    /// Creation timestamp of a secret version.
    async fn get_create_time(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<DateTime<Utc>>;

    /// The secret's label map.
    async fn get_secret_labels(&self, project: &str, id: &str)
        -> Result<HashMap<String, String>>;

    /// The payload bytes of a secret version.
    async fn access_secret_version(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<Vec<u8>>;

    /// The state of a secret version.
    async fn get_secret_version_state(
        &self,
        project: &str,
        id: &str,
        version: &str,
    ) -> Result<VersionState>;

    async fn enable_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()>;

    async fn disable_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()>;

    async fn destroy_secret_version(&self, project: &str, id: &str, version: &str) -> Result<()>;

    /// Insert or update one label. Implemented as read-modify-write of the
    /// whole label map; concurrent writers race at last-writer-wins
    /// granularity.
    async fn upsert_secret_label(
        &self,
        project: &str,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Remove one label, read-modify-write like `upsert_secret_label`.
    async fn delete_secret_label(&self, project: &str, id: &str, key: &str) -> Result<()>;
}
