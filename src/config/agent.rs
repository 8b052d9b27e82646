//! # Configuration Agent
//!
//! Owns the currently-published configuration snapshot and keeps it fresh.
//! The initial load is fatal on failure; reload failures are logged and the
//! previous snapshot is retained. Every successful publish re-syncs the cron
//! scheduler so schedule entries track the config.
//!
//! Publishing is a pointer swap under a reader-preferring lock: consumers
//! clone the `Arc` snapshot and iterate outside the lock, so a concurrent
//! reload can never expose a half-updated document.

use crate::config::cron::CronScheduler;
use crate::config::Configuration;
use crate::errors::{KeywheelError, Result};
use notify::{RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared holder of the most recently loaded, validated configuration.
pub struct ConfigAgent {
    snapshot: RwLock<Arc<Configuration>>,
    cron: Arc<CronScheduler>,
    registered_kinds: HashSet<String>,
}

impl ConfigAgent {
    pub fn new(cron: Arc<CronScheduler>, registered_kinds: HashSet<String>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Configuration::default())),
            cron,
            registered_kinds,
        }
    }

    /// The currently-published configuration. Safe to call concurrently with
    /// reloads; the returned snapshot is immutable.
    pub fn snapshot(&self) -> Arc<Configuration> {
        Arc::clone(&self.snapshot.read().expect("config lock poisoned"))
    }

    /// Atomically publish a configuration. Exposed for tests; production
    /// publishes go through [`ConfigAgent::watch`] reloads.
    pub fn set(&self, config: Configuration) {
        *self.snapshot.write().expect("config lock poisoned") = Arc::new(config);
    }

    /// Drain the cron scheduler's queued refresh identifiers.
    pub fn queued_refreshes(&self) -> HashSet<String> {
        self.cron.queued_and_reset()
    }

    fn reload(&self, path: &Path) -> Result<()> {
        let config = Configuration::load(path)?;
        config.validate(&self.registered_kinds)?;
        info!(
            rotation_specs = config.rotation_specs.len(),
            sync_specs = config.sync_specs.len(),
            "publishing configuration"
        );
        self.set(config);
        self.cron.sync(&self.snapshot())
    }

    /// Perform the initial load and return a watch handle. A failure to load
    /// or validate here is returned to the caller, which treats it as fatal.
    pub fn watch(self: &Arc<Self>, path: impl Into<PathBuf>) -> Result<ConfigWatch> {
        let path = path.into();
        self.reload(&path)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(ConfigWatch { agent: Arc::clone(self), path })
    }
}

/// Handle returned by [`ConfigAgent::watch`]; `run` drives reloads until the
/// cancellation signal fires.
pub struct ConfigWatch {
    agent: Arc<ConfigAgent>,
    path: PathBuf,
}

impl ConfigWatch {
    /// Watch the config file's directory (mounted config volumes swap the
    /// whole directory atomically) and re-run load + validate on mutation.
    /// Bursts of events coalesce into a single reload.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |event: notify::Result<notify::Event>| {
                // the event is only a wakeup; the reload re-reads the file
                let _ = tx.send(event);
            },
        )
        .map_err(|e| {
            KeywheelError::config_with_source("failed to create config watcher", Box::new(e))
        })?;

        let dir =
            self.path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        watcher.watch(&dir, RecursiveMode::NonRecursive).map_err(|e| {
            KeywheelError::config_with_source(
                format!("failed to watch {}", dir.display()),
                Box::new(e),
            )
        })?;

        info!(path = %self.path.display(), "watching configuration for changes");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("configuration watcher stopping");
                    return Ok(());
                }
                event = rx.recv() => {
                    let Some(event) = event else { return Ok(()) };
                    if let Err(e) = event {
                        warn!(error = %e, "configuration watch event error");
                        continue;
                    }
                    // let the burst settle, then drain whatever queued up so
                    // at most one reload runs per burst
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    while rx.try_recv().is_ok() {}

                    match self.agent.reload(&self.path) {
                        Ok(()) => info!(path = %self.path.display(), "configuration reloaded"),
                        Err(e) => error!(
                            error = %e,
                            path = %self.path.display(),
                            "failed to reload configuration, keeping previous snapshot"
                        ),
                    }
                }
            }
        }
    }
}
