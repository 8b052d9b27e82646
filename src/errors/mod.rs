//! # Error Handling
//!
//! Crate-wide error types for keywheel, built on `thiserror`.

mod types;

pub use types::{KeywheelError, Result};
