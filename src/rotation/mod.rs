//! # Rotation
//!
//! The rotation reconciler: refreshes credentials on schedule and retires
//! superseded versions after their grace period.

pub mod controller;

pub use controller::RotationController;
