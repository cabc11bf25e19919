//! Error types for the challenge-response client

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for challenge-auth
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a non-success HTTP status returned by the verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 500
    InternalServer,
    /// 429
    TooManyRequests,
    /// Any other status
    Other,
}

impl HttpErrorKind {
    /// Map an HTTP status code to its kind
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            500 => Self::InternalServer,
            429 => Self::TooManyRequests,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "endpoint not found",
            Self::InternalServer => "internal server error",
            Self::TooManyRequests => "too many requests",
            Self::Other => "http error",
        };
        f.write_str(label)
    }
}

/// challenge-auth errors
#[derive(Error, Debug)]
pub enum Error {
    /// Client configuration rejected at construction
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Signing or verification key missing or unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Challenge was the empty string
    #[error("Challenge is empty")]
    EmptyInput,

    /// Signature text could not be decoded
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Signature does not match the challenge under the given key
    #[error("Signature verification failed")]
    SignatureMismatch,

    /// Transport-level failure (connect, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Verifier answered with a non-success status
    #[error("HTTP {status} ({kind}): {message}")]
    Http {
        /// Literal status code
        status: u16,
        /// Status classification
        kind: HttpErrorKind,
        /// Server-provided error text, or the raw body
        message: String,
    },

    /// Response body was not the expected JSON shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Verifier reported `success: false`
    #[error("Authentication failed: unauthorized: {0}")]
    Unauthorized(String),

    /// PEM encoding, decoding or key generation failure
    #[error("Key error: {0}")]
    Key(String),

    /// Application configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build an HTTP error, deriving the kind from the status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            kind: HttpErrorKind::from_status(status),
            message: message.into(),
        }
    }

    /// Whether the failure is transient and the whole exchange may be retried.
    ///
    /// Transport failures, any 5xx and 429 qualify. Everything else
    /// (configuration, signing, decoding, other 4xx, `success: false`) does not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => (500..600).contains(status) || *status == 429,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
