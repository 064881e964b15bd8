//! # Error Types
//!
//! Error types for the flowsync engine using `thiserror`.
//!
//! Per-resource findings (a route pointing at a missing upstream, a duplicate
//! listener port) are never errors: they travel as [`crate::domain::Diagnostic`]s
//! and end up in resource status. The variants here cover infrastructure and
//! startup failures only.

/// Custom result type for flowsync operations
pub type Result<T> = std::result::Result<T, FlowsyncError>;

/// Main error type for the flowsync engine
#[derive(thiserror::Error, Debug)]
pub enum FlowsyncError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for requests entering the engine
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Resource not found errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Resource store errors (unreachable backend, rejected write)
    #[error("Store error: {message}")]
    Store { message: String },

    /// A whole translation cycle could not be produced
    #[error("Translation error: {message}")]
    Translation { message: String },

    /// Network transport errors (gRPC, HTTP)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization { context: String },

    /// Startup readiness barrier elapsed
    #[error("Warm-up timed out after {timeout_ms}ms waiting for: {pending}")]
    WarmupTimeout { timeout_ms: u64, pending: String },

    /// The engine was cancelled while waiting
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FlowsyncError {
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

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store { message: message.into() }
    }

    pub fn translation<S: Into<String>>(message: S) -> Self {
        Self::Translation { message: message.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn warmup_timeout<S: Into<String>>(timeout_ms: u64, pending: S) -> Self {
        Self::WarmupTimeout { timeout_ms, pending: pending.into() }
    }

    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled { operation: operation.into() }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if this error should be retried at the boundary that produced it
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Transport { .. } | Self::Io { .. })
    }
}

impl From<std::io::Error> for FlowsyncError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for FlowsyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { context: format!("JSON serialization failed: {}", error) }
    }
}

impl From<serde_yaml::Error> for FlowsyncError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization { context: format!("YAML serialization failed: {}", error) }
    }
}

impl From<config::ConfigError> for FlowsyncError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for FlowsyncError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
