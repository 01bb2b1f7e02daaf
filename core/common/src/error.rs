//! Common error types for InvoiceDrive.

use thiserror::Error;

/// Top-level error type for InvoiceDrive operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No credential could be resolved from any source.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// A credential source was selected but its material is absent.
    #[error("Credential configuration missing: {0}")]
    ConfigMissing(String),

    /// A credential document could not be parsed.
    #[error("Malformed credential document: {0}")]
    Parse(String),

    /// An expired token could not be refreshed.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The interactive consent flow cannot run in this environment.
    #[error("Interactive authorization unavailable: {0}")]
    InteractiveUnavailable(String),

    /// The upload payload does not exist or is empty.
    #[error("File not found: {0}")]
    PayloadNotFound(String),

    /// The provider rejected the call. The message is passed through verbatim.
    #[error("{0}")]
    Provider(String),

    /// Local state could not be written or read.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse classification of an [`Error`], used when mapping onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    ConfigMissing,
    Parse,
    RefreshFailed,
    InteractiveUnavailable,
    PayloadNotFound,
    Provider,
    Persistence,
    InvalidInput,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::ConfigMissing => "CONFIG_MISSING",
            ErrorKind::Parse => "PARSE_ERROR",
            ErrorKind::RefreshFailed => "REFRESH_FAILED",
            ErrorKind::InteractiveUnavailable => "INTERACTIVE_UNAVAILABLE",
            ErrorKind::PayloadNotFound => "PAYLOAD_NOT_FOUND",
            ErrorKind::Provider => "PROVIDER_ERROR",
            ErrorKind::Persistence => "PERSISTENCE_ERROR",
            ErrorKind::InvalidInput => "INVALID_INPUT",
        }
    }

    /// Whether the failure was caused by the caller rather than the server
    /// or the provider.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::PayloadNotFound | ErrorKind::InvalidInput)
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Error::ConfigMissing(_) => ErrorKind::ConfigMissing,
            Error::Parse(_) => ErrorKind::Parse,
            Error::RefreshFailed(_) => ErrorKind::RefreshFailed,
            Error::InteractiveUnavailable(_) => ErrorKind::InteractiveUnavailable,
            Error::PayloadNotFound(_) => ErrorKind::PayloadNotFound,
            Error::Provider(_) => ErrorKind::Provider,
            Error::Persistence(_) | Error::Io(_) => ErrorKind::Persistence,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message_is_verbatim() {
        let err = Error::Provider("The user does not have sufficient permissions".to_string());
        assert_eq!(
            err.to_string(),
            "The user does not have sufficient permissions"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::PayloadNotFound("x".into()).kind().is_client_error());
        assert!(Error::InvalidInput("x".into()).kind().is_client_error());
        assert!(!Error::Unauthenticated("x".into()).kind().is_client_error());
        assert!(!Error::Provider("x".into()).kind().is_client_error());
    }

    #[test]
    fn test_io_counts_as_persistence() {
        let err: Error = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(err.kind().as_str(), "PERSISTENCE_ERROR");
    }
}
