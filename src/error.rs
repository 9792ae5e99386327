use std::fmt;
use std::io;
use thiserror::Error;

/// Boxed error returned by signing and storage backends
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Generic error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or contradictory request fields
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced authority or certificate is unknown to the backend
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The certificate has already been revoked
    #[error("Certificate already revoked: {0}")]
    AlreadyRevoked(String),

    /// A distinguished name could not be decoded
    #[error("Malformed name: {0}")]
    Malformed(String),

    /// Failure surfaced from the signing or storage backend
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Discriminant of [`Error`], for callers that branch on the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyRevoked,
    Malformed,
    Backend,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid_argument"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::AlreadyRevoked => write!(f, "already_revoked"),
            ErrorKind::Malformed => write!(f, "malformed"),
            ErrorKind::Backend => write!(f, "backend"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Io => write!(f, "io"),
        }
    }
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyRevoked(_) => ErrorKind::AlreadyRevoked,
            Error::Malformed(_) => ErrorKind::Malformed,
            Error::Backend { .. } => ErrorKind::Backend,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Backend failure without an underlying cause
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Backend failure wrapping the backend's own error
    pub fn backend_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Backend {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rcgen::Error> for Error {
    fn from(err: rcgen::Error) -> Self {
        Error::backend_with("certificate signing failed", err)
    }
}
