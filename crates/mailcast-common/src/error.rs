//! Error types for Mailcast

use thiserror::Error;

/// Main error type for Mailcast
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing or malformed {0}")]
    MissingResource(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Mailcast
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::MissingResource(_) => "MISSING_RESOURCE",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error must stop a campaign before any task runs
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingResource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::MissingResource("recipients".to_string()).code(),
            "MISSING_RESOURCE"
        );
        assert_eq!(Error::Validation("x".to_string()).code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_missing_resource_message() {
        let err = Error::MissingResource("recipients".to_string());
        assert_eq!(err.to_string(), "Missing or malformed recipients");
        assert!(err.is_fatal());
        assert!(!Error::Internal("boom".to_string()).is_fatal());
    }
}
