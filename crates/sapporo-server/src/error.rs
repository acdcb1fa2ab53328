//! Error types for the sapporo-web server
//!
//! This module contains the error types used throughout the server.

use thiserror::Error;

use sapporo_core::CoreError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unique key already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not signed in, or bad credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Signed in but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A WES endpoint failed or answered something unexpected
    #[error("WES error: {0}")]
    WesError(String),

    /// Template missing or failed to render
    #[error("Template error: {0}")]
    TemplateError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => ServerError::NotFound(format!("{} {}", entity, id)),
            CoreError::ValidationError(msg)
            | CoreError::ReferenceError(msg)
            | CoreError::WorkflowParseError(msg) => ServerError::ValidationError(msg),
            CoreError::Conflict(msg) => ServerError::Conflict(msg),
            CoreError::ConfigurationError(msg) => ServerError::ConfigError(msg),
            CoreError::StateStoreError(msg) | CoreError::SerializationError(msg) => {
                ServerError::StateStoreError(msg)
            }
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::ValidationError(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(err: reqwest::Error) -> Self {
        ServerError::WesError(format!("HTTP request error: {}", err))
    }
}

impl From<minijinja::Error> for ServerError {
    fn from(err: minijinja::Error) -> Self {
        ServerError::TemplateError(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(format!("IO error: {}", err))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::InternalError(format!("Error: {}", err))
    }
}

impl ServerError {
    /// Errors caused by user input, shown back on the form that produced them
    pub fn is_user_error(&self) -> bool {
        matches!(self, ServerError::ValidationError(_) | ServerError::Conflict(_))
    }

    /// Message suitable for a form, without the variant prefix
    pub fn user_message(&self) -> String {
        match self {
            ServerError::ValidationError(msg) | ServerError::Conflict(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_server_errors() {
        let err: ServerError = CoreError::not_found("service", 3).into();
        assert_eq!(err.to_string(), "service 3 not found");

        let err: ServerError = CoreError::ReferenceError("service 9 does not exist".into()).into();
        assert!(err.is_user_error());
        assert_eq!(err.user_message(), "service 9 does not exist");

        let err: ServerError = CoreError::StateStoreError("down".into()).into();
        assert!(!err.is_user_error());
    }
}
