//! Error types for the adaptive query pipeline.
//!
//! Errors fall into a few families: input errors (an empty query), component
//! state errors (disabled, not started, already registered), plan evaluation
//! errors that are normally recovered locally, and external failures raised by
//! the retrieval collaborator.

use thiserror::Error;

/// Core error type for the adaptive query pipeline.
#[derive(Error, Debug)]
pub enum AdaptiveQueryError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised while loading layered configuration
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// The query was empty or contained only whitespace
    #[error("Query cannot be empty")]
    EmptyQuery,

    /// A component was invoked while disabled by configuration
    #[error("Component is disabled: {component}")]
    Disabled {
        /// Name of the disabled component
        component: String,
    },

    /// A component was invoked before being started
    #[error("Component is not started: {component}")]
    NotStarted {
        /// Name of the component
        component: String,
    },

    /// A component was started twice
    #[error("Component is already started: {component}")]
    AlreadyStarted {
        /// Name of the component
        component: String,
    },

    /// A component with the same name is already registered
    #[error("Component already registered: {name}")]
    AlreadyRegistered {
        /// Name of the duplicate component
        name: String,
    },

    /// Resource not found errors
    #[error("Not found: {resource}")]
    NotFound {
        /// Name of the missing resource
        resource: String,
    },

    /// A task plan failed validation
    #[error("Invalid plan: {message}")]
    InvalidPlan {
        /// Detailed error message
        message: String,
    },

    /// The retrieval collaborator failed
    #[error("Retrieval error: {message}")]
    Retrieval {
        /// Detailed error message
        message: String,
    },

    /// Operation timeout errors
    #[error("Timeout: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
    },

    /// Component lifecycle failures (start/stop/initialize)
    #[error("Lifecycle error: {message}")]
    Lifecycle {
        /// Detailed error message
        message: String,
    },

    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {message}")]
    Validation {
        /// Detailed error message
        message: String,
    },

    /// Internal pipeline errors
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message
        message: String,
    },

    /// Generic errors from external collaborators
    #[error("External error: {source}")]
    External {
        /// The underlying error
        #[source]
        source: anyhow::Error,
    },
}

impl AdaptiveQueryError {
    /// Create a disabled-component error.
    pub fn disabled<S: Into<String>>(component: S) -> Self {
        Self::Disabled {
            component: component.into(),
        }
    }

    /// Create a not-started error.
    pub fn not_started<S: Into<String>>(component: S) -> Self {
        Self::NotStarted {
            component: component.into(),
        }
    }

    /// Create an already-started error.
    pub fn already_started<S: Into<String>>(component: S) -> Self {
        Self::AlreadyStarted {
            component: component.into(),
        }
    }

    /// Create an already-registered error.
    pub fn already_registered<S: Into<String>>(name: S) -> Self {
        Self::AlreadyRegistered { name: name.into() }
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid plan error.
    pub fn invalid_plan<S: Into<String>>(message: S) -> Self {
        Self::InvalidPlan {
            message: message.into(),
        }
    }

    /// Create a retrieval error.
    pub fn retrieval<S: Into<String>>(message: S) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a lifecycle error.
    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }

    /// Create a new configuration error with a message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new validation error with a message.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new internal error with a message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Retrieval failures and timeouts are transient; everything else is a
    /// caller or programming error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Retrieval { .. } | Self::Timeout { .. } | Self::External { .. }
        )
    }

    /// Check if this error was caused by the caller (bad input or a
    /// mis-sequenced lifecycle call).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery
                | Self::Disabled { .. }
                | Self::NotStarted { .. }
                | Self::AlreadyStarted { .. }
                | Self::AlreadyRegistered { .. }
                | Self::NotFound { .. }
                | Self::Configuration { .. }
                | Self::Validation { .. }
        )
    }
}

impl From<anyhow::Error> for AdaptiveQueryError {
    fn from(source: anyhow::Error) -> Self {
        Self::External { source }
    }
}

/// Result type alias for adaptive query operations.
pub type Result<T> = std::result::Result<T, AdaptiveQueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AdaptiveQueryError::not_started("decision_engine");
        assert!(matches!(err, AdaptiveQueryError::NotStarted { .. }));
        assert_eq!(err.to_string(), "Component is not started: decision_engine");

        let err = AdaptiveQueryError::already_registered("classifier");
        assert_eq!(err.to_string(), "Component already registered: classifier");
    }

    #[test]
    fn test_error_retryable() {
        assert!(AdaptiveQueryError::retrieval("backend down").is_retryable());
        assert!(AdaptiveQueryError::timeout("search").is_retryable());
        assert!(!AdaptiveQueryError::EmptyQuery.is_retryable());
        assert!(!AdaptiveQueryError::invalid_plan("no tasks").is_retryable());
    }

    #[test]
    fn test_error_client_classification() {
        assert!(AdaptiveQueryError::EmptyQuery.is_client_error());
        assert!(AdaptiveQueryError::disabled("rewriter").is_client_error());
        assert!(!AdaptiveQueryError::internal("boom").is_client_error());
    }

    #[test]
    fn test_from_anyhow() {
        let err: AdaptiveQueryError = anyhow::anyhow!("socket closed").into();
        assert!(matches!(err, AdaptiveQueryError::External { .. }));
        assert!(err.to_string().contains("socket closed"));
    }
}
