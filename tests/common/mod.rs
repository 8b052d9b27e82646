//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keywheel::config::{ConfigAgent, Configuration, CronScheduler, RefreshStrategy, RotationSpec};
use keywheel::errors::{KeywheelError, Result};
use keywheel::provision::{ProvisionedCredential, Provisioner, ProvisionerRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn time(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn hours(h: u64) -> Duration {
    Duration::from_secs(h * 3600)
}

/// Deterministic provisioner: sequentially numbered key ids and payloads,
/// and a record of every revoked key id.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    created: AtomicUsize,
    deactivated: Mutex<Vec<String>>,
}

impl MockProvisioner {
    pub fn deactivated(&self) -> Vec<String> {
        self.deactivated.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    fn kind_tag(&self) -> &'static str {
        "serviceAccountKey"
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
        _labels: &HashMap<String, String>,
    ) -> Result<ProvisionedCredential> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProvisionedCredential {
            external_id: format!("key_id-new-{}", n),
            payload: format!("secret-data-new-{}", n).into_bytes(),
        })
    }

    async fn deactivate(&self, labels: &HashMap<String, String>, version: &str) -> Result<()> {
        let key_id = labels.get(&format!("v{}", version)).cloned().ok_or_else(|| {
            KeywheelError::provision(format!("no key recorded for version {}", version))
        })?;
        self.deactivated.lock().unwrap().push(key_id);
        Ok(())
    }
}

/// Registry holding a single [`MockProvisioner`].
pub fn mock_registry() -> (Arc<ProvisionerRegistry>, Arc<MockProvisioner>) {
    let provisioner = Arc::new(MockProvisioner::default());
    let mut registry = ProvisionerRegistry::new();
    registry.register(Arc::clone(&provisioner) as Arc<dyn Provisioner>);
    (Arc::new(registry), provisioner)
}

/// An agent publishing `config`, with a fresh cron scheduler.
pub fn agent_with(config: Configuration) -> Arc<ConfigAgent> {
    let kinds: HashSet<String> = ["serviceAccountKey".to_string()].into_iter().collect();
    let agent = Arc::new(ConfigAgent::new(Arc::new(CronScheduler::new()), kinds));
    agent.set(config);
    agent
}

pub fn interval_rotation(project: &str, secret: &str, interval: Duration, grace: Duration) -> RotationSpec {
    RotationSpec {
        project: project.to_string(),
        secret: secret.to_string(),
        kind: "serviceAccountKey".to_string(),
        kind_parameters: HashMap::from([
            ("project".to_string(), project.to_string()),
            ("service-account".to_string(), "service-foo".to_string()),
        ]),
        refresh: RefreshStrategy { interval: Some(interval), cron: None },
        grace_period: grace,
    }
}

pub fn cron_rotation(project: &str, secret: &str, expr: &str, grace: Duration) -> RotationSpec {
    RotationSpec {
        project: project.to_string(),
        secret: secret.to_string(),
        kind: "serviceAccountKey".to_string(),
        kind_parameters: HashMap::from([
            ("project".to_string(), project.to_string()),
            ("service-account".to_string(), "service-foo".to_string()),
        ]),
        refresh: RefreshStrategy { interval: None, cron: Some(expr.to_string()) },
        grace_period: grace,
    }
}
