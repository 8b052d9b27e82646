//! # Keywheel
//!
//! Keywheel keeps production credentials fresh in two reconcile loops over a
//! hosted Secret Manager and a Kubernetes cluster:
//!
//! ```text
//! config file ──▶ Config Agent ──▶ Rotation Controller ──▶ Secret Manager
//!                     │   ▲                                      │
//!                     ▼   │ cron triggers                        ▼
//!              Cron Scheduler       Sync Controller ──▶ Cluster Secrets
//! ```
//!
//! - **Rotation** provisions fresh credentials of a configured kind,
//!   publishes them as new immutable secret versions, and destroys
//!   superseded versions once their grace period expires. All rotation
//!   state lives in the remote secret's labels.
//! - **Synchronization** mirrors the latest version of each configured
//!   secret into a named key of a cluster Secret so workloads that mount it
//!   observe fresh material.
//!
//! Both loops are driven by the same tick scheduler and share a hot-reloaded
//! configuration snapshot.

pub mod cli;
pub mod clients;
pub mod config;
pub mod errors;
pub mod observability;
pub mod provision;
pub mod rotation;
pub mod scheduler;
pub mod sync;

// Re-export commonly used types and traits
pub use errors::{KeywheelError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "keywheel");
    }
}
