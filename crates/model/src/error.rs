use std::error::Error as StdError;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport could not reach the backend.
    ConnectionFailure,
    /// The backend answered with a non-success status.
    BackendError,
    /// The backend answered with something this client doesn't recognize.
    ProtocolViolation,
    /// The storage medium failed on a read or write.
    PersistenceFailure,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConnectionFailure => write!(f, "Connection failure"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::ProtocolViolation => write!(f, "Protocol violation"),
            ErrorKind::PersistenceFailure => write!(f, "Persistence failure"),
        }
    }
}

/// The normalized error of the bridge.
///
/// Whatever goes wrong underneath (transport, status codes, payload
/// parsing, file access), it's converted to exactly one `Error` at the
/// place it happens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates a new error.
    #[inline]
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new error with the `ConnectionFailure` kind.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::ConnectionFailure)
    }

    /// Creates a new error with the `BackendError` kind.
    #[inline]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::BackendError)
    }

    /// Creates a new error with the `ProtocolViolation` kind.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::ProtocolViolation)
    }

    /// Creates a new error with the `PersistenceFailure` kind.
    #[inline]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::PersistenceFailure)
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::backend("500 Internal Server Error: boom");
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert_eq!(
            err.to_string(),
            "Backend error: 500 Internal Server Error: boom"
        );
    }
}
