//! # Error Types
//!
//! Error types for the rotation and sync controllers using `thiserror`.
//!
//! `NotFound` is its own variant rather than a message string because the
//! rotation algorithm treats absence as a signal: a missing version 1
//! triggers bootstrap, and a missing successor version marks the current
//! version as latest.

/// Custom result type for keywheel operations
pub type Result<T> = std::result::Result<T, KeywheelError>;

/// Main error type for the keywheel controllers
#[derive(thiserror::Error, Debug)]
pub enum KeywheelError {
    /// Configuration errors (load, watch)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for configuration documents
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// A named resource does not exist
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Secret store (Secret Manager) errors
    #[error("Secret store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cluster (Kubernetes) API errors
    #[error("Cluster error: {message}")]
    Cluster {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential provisioner errors
    #[error("Provisioner error: {message}")]
    Provision {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cron scheduling errors
    #[error("Cron error: {message}")]
    Cron {
        message: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_yaml::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl KeywheelError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a secret store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store { message: message.into(), source: None }
    }

    /// Create a secret store error with source
    pub fn store_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Store { message: message.into(), source: Some(source) }
    }

    /// Create a cluster error
    pub fn cluster<S: Into<String>>(message: S) -> Self {
        Self::Cluster { message: message.into(), source: None }
    }

    /// Create a cluster error with source
    pub fn cluster_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Cluster { message: message.into(), source: Some(source) }
    }

    /// Create a provisioner error
    pub fn provision<S: Into<String>>(message: S) -> Self {
        Self::Provision { message: message.into(), source: None }
    }

    /// Create a provisioner error with source
    pub fn provision_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Provision { message: message.into(), source: Some(source) }
    }

    /// Create a cron error
    pub fn cron<S: Into<String>>(message: S) -> Self {
        Self::Cron { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error means the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for KeywheelError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_yaml::Error> for KeywheelError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization { source: error, context: "YAML serialization failed".to_string() }
    }
}
