//! Error taxonomy for remote share operations.

use std::io;

use protocol::messages::{ErrorCode, ErrorMessage};
use thiserror::Error;

/// Errors surfaced by every remote operation of the core.
///
/// Each failure reaches the immediate caller as a single value. Nothing is
/// retried; a [`ShareError::Network`] must be resubmitted as a new operation.
#[derive(Debug, Error)]
pub enum ShareError {
    /// The address could not be parsed into a remote address.
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// The target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server rejected the credential.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The credential lacks access to the target.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transient network failure (timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Unexpected remote response, e.g. the target already exists.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Text could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type alias for share operations.
pub type ShareResult<T> = Result<T, ShareError>;

impl ShareError {
    /// Map an I/O error raised while operating on `target`.
    pub fn from_io(err: io::Error, target: &str) -> Self {
        use io::ErrorKind;
        let detail = format!("{target}: {err}");
        match err.kind() {
            ErrorKind::NotFound => ShareError::NotFound(target.to_string()),
            ErrorKind::PermissionDenied => ShareError::PermissionDenied(target.to_string()),
            ErrorKind::AlreadyExists => {
                ShareError::Protocol(format!("{target}: already exists"))
            }
            ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ShareError::Network(detail),
            ErrorKind::InvalidData => ShareError::Encoding(detail),
            _ => ShareError::Protocol(detail),
        }
    }

    /// Boundary error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ShareError::MalformedAddress(_) => ErrorCode::MalformedAddress,
            ShareError::NotFound(_) => ErrorCode::NotFound,
            ShareError::AuthenticationFailure(_) => ErrorCode::AuthenticationFailure,
            ShareError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            ShareError::Network(_) => ErrorCode::NetworkError,
            ShareError::Protocol(_) => ErrorCode::ProtocolError,
            ShareError::Encoding(_) => ErrorCode::EncodingError,
        }
    }

    /// Whether resubmitting the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ShareError::Network(_))
    }

    /// Convert the error to a boundary [`ErrorMessage`].
    pub fn to_error_message(&self, context: Option<String>) -> ErrorMessage {
        ErrorMessage {
            code: self.code(),
            message: self.to_string(),
            context,
            recoverable: self.is_transient(),
        }
    }
}
