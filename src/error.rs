//! Error types for the public interface of the crate.
//!
//! Internally, functions return `Res<T>` which is an `anyhow::Result`. At module boundaries the
//! error is classified with an `ErrorType` by calling `pub_result` so that callers (the CLI and
//! the HTTP server) can distinguish a user-correctable problem from a missing record, a lost
//! subscription, or an unreachable store.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The internal result type.
pub(crate) type Res<T> = std::result::Result<T, anyhow::Error>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A required field is missing or malformed. The caller can correct this.
    Validation,
    /// An update or delete referenced a record that does not exist.
    NotFound,
    /// The standing subscription to the store's change stream was lost.
    SyncLost,
    /// A write or on-demand query could not reach the store.
    StoreUnavailable,
    /// The configuration or home directory is missing or invalid.
    Config,
    /// The HTTP service could not be started.
    Service,
    /// Anything else.
    Internal,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// The public error type. It carries an `ErrorType` and the underlying `anyhow::Error` with its
/// context chain.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    pub fn validation(message: impl Display) -> Self {
        Self::new(ErrorType::Validation, anyhow::anyhow!("{message}"))
    }

    pub fn not_found(message: impl Display) -> Self {
        Self::new(ErrorType::NotFound, anyhow::anyhow!("{message}"))
    }

    pub fn sync_lost(message: impl Display) -> Self {
        Self::new(ErrorType::SyncLost, anyhow::anyhow!("{message}"))
    }

    pub fn store_unavailable(message: impl Display) -> Self {
        Self::new(ErrorType::StoreUnavailable, anyhow::anyhow!("{message}"))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Adds context to the message while keeping the `ErrorType`.
    pub fn context<C>(self, context: C) -> Self
    where
        C: Display + Send + Sync + 'static,
    {
        Self {
            error_type: self.error_type,
            inner: self.inner.context(context),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {:?}", self.error_type, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    /// Unwraps an `Error` that was previously boxed into an `anyhow::Error`, otherwise treats it as
    /// an internal error.
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<Error>() {
            Ok(e) => e,
            Err(other) => Error::new(ErrorType::Internal, other),
        }
    }
}

/// Converts an internal result into a public `Result` with the given `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
