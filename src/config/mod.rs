//! # Configuration
//!
//! The declarative configuration for both controllers: the document types
//! and validation ([`spec`]), the hot-reloading agent ([`agent`]), and the
//! cron scheduler fed by the agent ([`cron`]).

pub mod agent;
pub mod cron;
pub mod spec;

pub use agent::{ConfigAgent, ConfigWatch};
pub use cron::CronScheduler;
pub use spec::{
    ClusterLocation, Configuration, RefreshStrategy, RotationSpec, SecretManagerLocation, SyncSpec,
};
