//! # Configuration Document
//!
//! Defines the on-disk configuration for the rotation and sync controllers:
//! a single YAML document with a `rotationSpecs` list and a `syncSpecs` list.
//! Durations are humantime strings (`"48h"`), cron expressions are standard
//! five-field, and unknown fields are rejected on load.

use crate::errors::{KeywheelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// The full configuration document. Replaced atomically by the config agent;
/// consumers only ever see a complete snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub rotation_specs: Vec<RotationSpec>,
    #[serde(default)]
    pub sync_specs: Vec<SyncSpec>,
}

/// A single rotated secret: which Secret Manager secret to maintain, what
/// kind of credential backs it, how often to refresh it, and how long old
/// versions overlap with their successor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RotationSpec {
    pub project: String,
    pub secret: String,
    /// Tag selecting a registered provisioner, e.g. `serviceAccountKey`.
    pub kind: String,
    /// Kind-specific identifying fields, e.g. the upstream service account.
    #[serde(default)]
    pub kind_parameters: HashMap<String, String>,
    pub refresh: RefreshStrategy,
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

/// Exactly one of `interval` or `cron` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshStrategy {
    #[serde(default, with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

/// A single sync pair: the Secret Manager source and the cluster destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSpec {
    pub source: SecretManagerLocation,
    pub destination: ClusterLocation,
}

/// A Secret Manager secret addressed by project and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretManagerLocation {
    pub project: String,
    pub secret: String,
}

/// A key of a namespaced cluster Secret object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterLocation {
    pub namespace: String,
    pub secret: String,
    pub key: String,
}

impl RotationSpec {
    /// Canonical identifier for this rotation target. Used as the key in the
    /// cron scheduler's entry map and in per-spec log lines.
    pub fn id(&self) -> String {
        format!("projects/{}/secrets/{}", self.project, self.secret)
    }

    fn validate(&self, registered_kinds: &HashSet<String>) -> Result<()> {
        if self.project.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing project for rotated secret {}", self),
                "project",
            ));
        }
        if self.secret.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing secret for rotated secret {}", self),
                "secret",
            ));
        }
        if !registered_kinds.contains(&self.kind) {
            return Err(KeywheelError::validation_field(
                format!("unknown credential kind '{}' for rotated secret {}", self.kind, self),
                "kind",
            ));
        }

        match (self.refresh.interval, self.refresh.cron.as_deref()) {
            (Some(interval), None) => {
                if interval.is_zero() {
                    return Err(KeywheelError::validation_field(
                        format!("refresh interval must be non-zero for rotated secret {}", self),
                        "refresh.interval",
                    ));
                }
            }
            (None, Some(expr)) => {
                if expr.is_empty() {
                    return Err(KeywheelError::validation_field(
                        format!("refresh cron must be non-empty for rotated secret {}", self),
                        "refresh.cron",
                    ));
                }
                crate::config::cron::parse_schedule(expr).map_err(|e| {
                    KeywheelError::validation_field(
                        format!("invalid refresh cron for rotated secret {}: {}", self, e),
                        "refresh.cron",
                    )
                })?;
            }
            (Some(_), Some(_)) => {
                return Err(KeywheelError::validation_field(
                    format!(
                        "exactly one refresh strategy may be set for rotated secret {}",
                        self
                    ),
                    "refresh",
                ));
            }
            (None, None) => {
                return Err(KeywheelError::validation_field(
                    format!("missing refresh strategy for rotated secret {}", self),
                    "refresh",
                ));
            }
        }

        Ok(())
    }
}

impl SyncSpec {
    fn validate(&self) -> Result<()> {
        if self.source.project.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing project for source in sync spec {}", self),
                "source.project",
            ));
        }
        if self.source.secret.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing secret for source in sync spec {}", self),
                "source.secret",
            ));
        }
        if self.destination.namespace.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing namespace for destination in sync spec {}", self),
                "destination.namespace",
            ));
        }
        if self.destination.secret.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing secret for destination in sync spec {}", self),
                "destination.secret",
            ));
        }
        if self.destination.key.is_empty() {
            return Err(KeywheelError::validation_field(
                format!("missing key for destination in sync spec {}", self),
                "destination.key",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RotationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/secrets/{}", self.project, self.secret)
    }
}

impl fmt::Display for SecretManagerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/secrets/{}", self.project, self.secret)
    }
}

impl fmt::Display for ClusterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "namespaces/{}/secrets/{}[{}]", self.namespace, self.secret, self.key)
    }
}

impl fmt::Display for SyncSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} -> {}}}", self.source, self.destination)
    }
}

impl Configuration {
    /// Load a configuration document from a YAML file. Parsing alone; call
    /// [`Configuration::validate`] before publishing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| KeywheelError::Io {
            source: e,
            context: format!("reading config {}", path.display()),
        })?;
        if metadata.is_dir() {
            return Err(KeywheelError::config(format!(
                "config cannot be a directory: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| KeywheelError::Io {
            source: e,
            context: format!("reading config {}", path.display()),
        })?;

        serde_yaml::from_str(&raw).map_err(|e| KeywheelError::Serialization {
            source: e,
            context: format!("parsing config {}", path.display()),
        })
    }

    /// Validate the document against the set of registered credential kinds.
    pub fn validate(&self, registered_kinds: &HashSet<String>) -> Result<()> {
        if self.rotation_specs.is_empty() && self.sync_specs.is_empty() {
            return Err(KeywheelError::validation("empty configuration"));
        }

        for spec in &self.rotation_specs {
            spec.validate(registered_kinds)?;
        }

        // A cluster key has at most one source, which also rules out
        // duplicate sync entries.
        let mut source_for: HashMap<&ClusterLocation, &SecretManagerLocation> = HashMap::new();
        for spec in &self.sync_specs {
            spec.validate()?;
            if let Some(existing) = source_for.get(&spec.destination) {
                return Err(KeywheelError::validation(format!(
                    "cannot add sync pair {}: secret {} already has a source ({})",
                    spec, spec.destination, existing
                )));
            }
            source_for.insert(&spec.destination, &spec.source);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> HashSet<String> {
        ["serviceAccountKey".to_string()].into_iter().collect()
    }

    fn interval_spec(project: &str, secret: &str, interval: Duration) -> RotationSpec {
        RotationSpec {
            project: project.to_string(),
            secret: secret.to_string(),
            kind: "serviceAccountKey".to_string(),
            kind_parameters: HashMap::from([
                ("project".to_string(), project.to_string()),
                ("service-account".to_string(), "service-foo".to_string()),
            ]),
            refresh: RefreshStrategy { interval: Some(interval), cron: None },
            grace_period: Duration::from_secs(2 * 3600),
        }
    }

    fn sync_spec(project: &str, secret: &str, ns: &str, name: &str, key: &str) -> SyncSpec {
        SyncSpec {
            source: SecretManagerLocation {
                project: project.to_string(),
                secret: secret.to_string(),
            },
            destination: ClusterLocation {
                namespace: ns.to_string(),
                secret: name.to_string(),
                key: key.to_string(),
            },
        }
    }

    #[test]
    fn test_parse_full_document() {
        let doc = r#"
rotationSpecs:
- project: project-1
  secret: secret-1
  kind: serviceAccountKey
  kindParameters:
    project: project-1
    service-account: service-foo
  refresh:
    interval: 48h
  gracePeriod: 2h
syncSpecs:
- source:
    project: project-1
    secret: secret-1
  destination:
    namespace: ns-a
    secret: secret-a
    key: key-a
"#;
        let config: Configuration = serde_yaml::from_str(doc).unwrap();
        assert_eq!(config.rotation_specs.len(), 1);
        assert_eq!(config.sync_specs.len(), 1);

        let rotation = &config.rotation_specs[0];
        assert_eq!(rotation.refresh.interval, Some(Duration::from_secs(48 * 3600)));
        assert_eq!(rotation.grace_period, Duration::from_secs(2 * 3600));
        assert_eq!(rotation.kind, "serviceAccountKey");
        assert_eq!(
            rotation.kind_parameters.get("service-account").map(String::as_str),
            Some("service-foo")
        );

        config.validate(&kinds()).unwrap();
    }

    #[test]
    fn test_parse_cron_strategy() {
        let doc = r#"
rotationSpecs:
- project: project-1
  secret: secret-1
  kind: serviceAccountKey
  refresh:
    cron: "0 0 * * 1"
  gracePeriod: 30m
"#;
        let config: Configuration = serde_yaml::from_str(doc).unwrap();
        assert_eq!(config.rotation_specs[0].refresh.cron.as_deref(), Some("0 0 * * 1"));
        config.validate(&kinds()).unwrap();
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let doc = r#"
rotationSpecs: []
syncSpecs: []
extraField: true
"#;
        assert!(serde_yaml::from_str::<Configuration>(doc).is_err());
    }

    #[test]
    fn test_empty_configuration_rejected() {
        let config = Configuration::default();
        let err = config.validate(&kinds()).unwrap_err();
        assert!(matches!(err, KeywheelError::Validation { .. }));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Configuration {
            rotation_specs: vec![interval_spec("project-1", "secret-1", Duration::ZERO)],
            sync_specs: vec![],
        };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_both_strategies_rejected() {
        let mut spec = interval_spec("project-1", "secret-1", Duration::from_secs(3600));
        spec.refresh.cron = Some("0 0 * * 1".to_string());
        let config = Configuration { rotation_specs: vec![spec], sync_specs: vec![] };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_missing_strategy_rejected() {
        let mut spec = interval_spec("project-1", "secret-1", Duration::from_secs(3600));
        spec.refresh = RefreshStrategy::default();
        let config = Configuration { rotation_specs: vec![spec], sync_specs: vec![] };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let mut spec = interval_spec("project-1", "secret-1", Duration::from_secs(3600));
        spec.refresh = RefreshStrategy { interval: None, cron: Some("not a cron".to_string()) };
        let config = Configuration { rotation_specs: vec![spec], sync_specs: vec![] };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_unregistered_kind_rejected() {
        let mut spec = interval_spec("project-1", "secret-1", Duration::from_secs(3600));
        spec.kind = "sshHostKey".to_string();
        let config = Configuration { rotation_specs: vec![spec], sync_specs: vec![] };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let config = Configuration {
            rotation_specs: vec![],
            sync_specs: vec![
                sync_spec("project-1", "secret-1", "ns-a", "secret-a", "key-a"),
                sync_spec("project-2", "secret-2", "ns-a", "secret-a", "key-a"),
            ],
        };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let config = Configuration {
            rotation_specs: vec![],
            sync_specs: vec![
                sync_spec("project-1", "secret-1", "ns-a", "secret-a", "key-a"),
                sync_spec("project-1", "secret-1", "ns-a", "secret-a", "key-a"),
            ],
        };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_missing_sync_field_rejected() {
        let config = Configuration {
            rotation_specs: vec![],
            sync_specs: vec![sync_spec("project-1", "secret-1", "", "secret-a", "key-a")],
        };
        assert!(config.validate(&kinds()).is_err());
    }

    #[test]
    fn test_display_forms() {
        let rotation = interval_spec("project-1", "secret-1", Duration::from_secs(3600));
        assert_eq!(rotation.to_string(), "projects/project-1/secrets/secret-1");
        assert_eq!(rotation.id(), "projects/project-1/secrets/secret-1");

        let sync = sync_spec("project-1", "secret-1", "ns-a", "secret-a", "key-a");
        assert_eq!(
            sync.to_string(),
            "{projects/project-1/secrets/secret-1 -> namespaces/ns-a/secrets/secret-a[key-a]}"
        );
    }
}
