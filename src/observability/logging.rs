//! # Structured Logging
//!
//! Provides structured logging setup using the tracing ecosystem.

use crate::errors::{KeywheelError, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt::{self, format::JsonFields},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static LOGGING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize structured logging. The filter comes from `RUST_LOG`, falling
/// back to `keywheel=info`.
pub fn init_logging(json: bool) -> Result<()> {
    LOGGING_INITIALIZED.get_or_try_init(|| configure_logging(json)).map(|_| ())
}

fn configure_logging(json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "keywheel=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        // JSON structured logging for production
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .fmt_fields(JsonFields::new());

        registry
            .with(json_layer)
            .try_init()
            .map_err(|e| KeywheelError::config(format!("Failed to initialize logging: {}", e)))?;
    } else {
        // Human-readable logging for development
        let pretty_layer = fmt::layer().with_target(true);

        registry
            .with(pretty_layer)
            .try_init()
            .map_err(|e| KeywheelError::config(format!("Failed to initialize logging: {}", e)))?;
    }

    Ok(())
}
