use crate::models::IncidentPk;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// A bulk load contained the same primary key twice
    #[error("Duplicate incident primary key in bulk load: {pk}")]
    DuplicateKey { pk: IncidentPk },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network errors (connection refused, timeouts, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Remote API answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pagination move that the current cursor state does not allow
    #[error("Pagination error: {0}")]
    Pagination(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Realtime transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::DuplicateKey { .. } => "DUPLICATE_KEY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Network(_) => "NETWORK_ERROR",
            AppError::Http { .. } => "HTTP_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Pagination(_) => "PAGINATION_ERROR",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// The engine itself never retries; this is advice for the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Transport(_) => true,
            AppError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from reqwest::Error
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            AppError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            AppError::Serialization(err.to_string())
        } else {
            AppError::Network(err.to_string())
        }
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::DuplicateKey { pk: 7 }.error_code(), "DUPLICATE_KEY");
        assert_eq!(
            AppError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            AppError::Pagination("no next page".to_string()).error_code(),
            "PAGINATION_ERROR"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::Network("refused".to_string()).is_retryable());
        assert!(AppError::Http {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_retryable());
        assert!(!AppError::Http {
            status: 404,
            message: "missing".to_string()
        }
        .is_retryable());
        assert!(!AppError::DuplicateKey { pk: 1 }.is_retryable());
    }

    #[test]
    fn test_duplicate_key_message() {
        let err = AppError::DuplicateKey { pk: 42 };
        assert_eq!(err.to_string(), "Duplicate incident primary key in bulk load: 42");
    }
}
