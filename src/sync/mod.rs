//! # Synchronization
//!
//! The sync reconciler: mirrors the latest Secret Manager values into
//! cluster Secret keys.

pub mod controller;

pub use controller::SyncController;
