//! # Observability
//!
//! Structured logging setup for the controllers.

pub mod logging;

pub use logging::init_logging;
