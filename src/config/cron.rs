//! # Cron Scheduler
//!
//! Translates rotation specs with a cron refresh strategy into scheduled
//! entries. Each entry carries a `triggered` bit that is set when the
//! schedule fires and consumed (and reset) by the rotation controller via
//! [`CronScheduler::queued_and_reset`]. Multiple fires between polls collapse
//! into a single bit. Expressions are standard five-field and evaluated in
//! UTC.

use crate::config::Configuration;
use crate::errors::{KeywheelError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Parse a standard five-field cron expression.
///
/// The `cron` crate expects a seconds field, so five-field input gets a
/// zero-seconds field prepended.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let full = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    Schedule::from_str(&full)
        .map_err(|e| KeywheelError::cron(format!("invalid cron expression '{}': {}", expr, e)))
}

/// Per-spec scheduling state.
struct EntryStatus {
    schedule: Schedule,
    /// The expression as written in the config; the entry is rebuilt when
    /// this changes on reload.
    cron_expr: String,
    next_fire: Option<DateTime<Utc>>,
    /// Set on fire, cleared by `queued_and_reset`.
    triggered: bool,
}

/// Scheduler holding one entry per cron-refreshed rotation spec, keyed by the
/// spec identifier. All state is guarded by a single mutex.
pub struct CronScheduler {
    entries: Mutex<HashMap<String, EntryStatus>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CronScheduler {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), cancel: Mutex::new(None) }
    }

    /// Start the time wheel: a background task that advances entries once a
    /// second. Idempotent; a second call replaces the previous task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let token = CancellationToken::new();
        if let Some(previous) = self.cancel.lock().expect("cron lock poisoned").replace(token.clone())
        {
            previous.cancel();
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        scheduler.tick(Utc::now());
                    }
                }
            }
        })
    }

    /// Stop the time wheel. Entries and triggered bits are retained.
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().expect("cron lock poisoned").take() {
            token.cancel();
        }
    }

    /// Advance every entry past `now`, setting triggered bits for fired
    /// schedules.
    fn tick(&self, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().expect("cron lock poisoned");
        for (id, entry) in entries.iter_mut() {
            while let Some(next) = entry.next_fire {
                if next > now {
                    break;
                }
                entry.triggered = true;
                entry.next_fire = entry.schedule.after(&now).next();
                debug!(spec = %id, "cron refresh triggered");
            }
        }
    }

    /// Reconcile the entry map against a configuration: add entries for
    /// cron-refreshed specs, rebuild entries whose expression changed, drop
    /// entries for interval-refreshed specs and for specs no longer present.
    /// Removal errors are aggregated; a scheduling error aborts the sync.
    pub fn sync(&self, config: &Configuration) -> Result<()> {
        let mut entries = self.entries.lock().expect("cron lock poisoned");

        for spec in &config.rotation_specs {
            let id = spec.id();
            match spec.refresh.cron.as_deref() {
                Some(expr) if !expr.is_empty() => {
                    if let Some(entry) = entries.get(&id) {
                        if entry.cron_expr == expr {
                            continue;
                        }
                        // expression changed, rebuild the entry
                        Self::remove_entry(&mut entries, &id)?;
                    }
                    let schedule = parse_schedule(expr)?;
                    let next_fire = schedule.after(&Utc::now()).next();
                    entries.insert(
                        id.clone(),
                        EntryStatus {
                            schedule,
                            cron_expr: expr.to_string(),
                            next_fire,
                            triggered: false,
                        },
                    );
                    debug!(spec = %id, cron = %expr, "scheduled cron refresh");
                }
                _ => {
                    // interval strategy: make sure no entry is left behind
                    entries.remove(&id);
                }
            }
        }

        let current: HashSet<String> = config.rotation_specs.iter().map(|s| s.id()).collect();
        let stale: Vec<String> =
            entries.keys().filter(|id| !current.contains(*id)).cloned().collect();

        let mut removal_errors = Vec::new();
        for id in stale {
            if let Err(e) = Self::remove_entry(&mut entries, &id) {
                removal_errors.push(e.to_string());
            }
        }
        if !removal_errors.is_empty() {
            return Err(KeywheelError::cron(removal_errors.join("; ")));
        }

        Ok(())
    }

    fn remove_entry(entries: &mut HashMap<String, EntryStatus>, id: &str) -> Result<()> {
        if entries.remove(id).is_none() {
            return Err(KeywheelError::cron(format!("entry {} was never scheduled", id)));
        }
        Ok(())
    }

    /// Return the identifiers whose schedule fired since the last call,
    /// atomically resetting each triggered bit. This is the only consumer of
    /// the bits, so an entry cannot appear in two consecutive calls unless
    /// its schedule fired in between.
    pub fn queued_and_reset(&self) -> HashSet<String> {
        let mut entries = self.entries.lock().expect("cron lock poisoned");
        let mut queued = HashSet::new();
        for (id, entry) in entries.iter_mut() {
            if entry.triggered {
                queued.insert(id.clone());
                entry.triggered = false;
            }
        }
        queued
    }

    /// Whether a refresh entry is currently scheduled for `id`.
    pub fn has(&self, id: &str) -> bool {
        self.entries.lock().expect("cron lock poisoned").contains_key(id)
    }
}
