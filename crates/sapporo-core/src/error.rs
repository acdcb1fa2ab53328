use thiserror::Error;

/// Core error type for sapporo-web domain and store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Entity with the given id does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. "service"
        entity: &'static str,
        /// Primary key or lookup key
        id: String,
    },

    /// Input rejected before it reached the store
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unique constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A foreign key points at a row that does not exist
    #[error("Reference error: {0}")]
    ReferenceError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Workflow content could not be parsed
    #[error("Workflow parse error: {0}")]
    WorkflowParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl CoreError {
    /// Shorthand for a not-found error keyed by a numeric id
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the error reports a missing row
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

/// Result alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::not_found("service", 3), "service not found: 3"),
            (CoreError::ValidationError("bad".to_string()), "Validation error: bad"),
            (CoreError::Conflict("dup".to_string()), "Conflict: dup"),
            (CoreError::ReferenceError("missing".to_string()), "Reference error: missing"),
            (CoreError::StateStoreError("db".to_string()), "State store error: db"),
            (CoreError::WorkflowParseError("yaml".to_string()), "Workflow parse error: yaml"),
            (CoreError::ConfigurationError("env".to_string()), "Configuration error: env"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_is_not_found() {
        assert!(CoreError::not_found("workflow", 1).is_not_found());
        assert!(!CoreError::Conflict("x".to_string()).is_not_found());
    }
}
