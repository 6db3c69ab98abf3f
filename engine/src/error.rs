//! Error types for the firesync engine.
//!
//! Every error raised by the engine itself ends up as an [`Error`]. Validation
//! failures are wrapped with a description of the operation that failed
//! ([`Error::Wrapped`]), and re-wrapping keeps the innermost cause so the
//! reason a value was rejected is never lost. Errors coming back from the
//! remote store are carried as [`RemoteError`] without being rewritten.

use thiserror::Error;

/// All possible errors from the firesync engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Definition-time errors
    #[error("invalid schema: {0}")]
    Schema(String),

    // Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An operation failed; `what` describes the operation, `why` the cause.
    #[error("{what}: {why}")]
    Wrapped { what: String, why: Box<Error> },

    // Connectivity errors
    #[error("no database is connected; call `Odm::connect` with a database before using remote operations")]
    NotConnected,

    #[error("model not registered: {0}")]
    UnknownModel(String),

    #[error("relation '{relation}' is not defined on {model}")]
    UnknownRelation { model: String, relation: String },

    #[error("invalid record id: {0:?}")]
    InvalidId(String),

    #[error("invalid record properties: {0}")]
    InvalidProps(String),

    #[error("invalid record path: {0:?}")]
    InvalidPath(String),

    // Remote store errors
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Wrap this error with a description of the failed operation.
    ///
    /// Wrapping an already wrapped error replaces only the description; the
    /// original cause is kept.
    pub fn wrap(self, what: impl Into<String>) -> Self {
        let why = match self {
            Error::Wrapped { why, .. } => why,
            other => Box::new(other),
        };
        Error::Wrapped {
            what: what.into(),
            why,
        }
    }

    /// The operation description, if this error is wrapped.
    pub fn what(&self) -> Option<&str> {
        match self {
            Error::Wrapped { what, .. } => Some(what.as_str()),
            _ => None,
        }
    }

    /// The underlying cause. Unwrapped errors are their own cause.
    pub fn why(&self) -> &Error {
        match self {
            Error::Wrapped { why, .. } => why.as_ref(),
            other => other,
        }
    }

    /// The validation failure behind this error, if any.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self.why() {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// A record value that does not conform to its schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("The required property '{path}' is missing")]
    MissingRequired { path: String },

    #[error("The property '{path}' is of the wrong type: expected {expected}, got {got}")]
    WrongType {
        path: String,
        expected: String,
        got: String,
    },
}

impl ValidationError {
    /// Dotted path of the offending property.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingRequired { path } => path.as_str(),
            ValidationError::WrongType { path, .. } => path.as_str(),
        }
    }
}

/// Failure reported by a remote store implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("write to '{path}' rejected: {reason}")]
    Rejected { path: String, reason: String },

    #[error("invalid path: {0:?}")]
    InvalidPath(String),
}

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
