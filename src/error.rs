//! Errors carried through the middleware stack.

use std::error::Error as StdError;
use std::sync::Arc;

use hyper::StatusCode;
use thiserror::Error;

use crate::handler::Next;

/// Boxed error accepted by [`Error::new`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type returned by handlers. Defaults to `Result<Next, Error>`, so a
/// handler can use `?` and have the error delivered to the next error handler.
pub type Result<T = Next, E = Error> = std::result::Result<T, E>;

/// An error travelling down the stack towards an error handler.
///
/// Errors are cheap to clone: the result of a param callback is cached for the
/// rest of the request and replayed for every later layer capturing the same
/// parameter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A captured path parameter was not valid percent-encoded UTF-8.
    #[error("failed to decode param '{value}'")]
    Decode { value: String },

    /// An error with an explicit HTTP status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// A handler panicked while it was running.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Any other error returned by a handler.
    #[error("{0}")]
    Other(Arc<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error.
    /// ```rust
    /// use junction::Error;
    ///
    /// let err = Error::new("boom");
    /// assert_eq!(err.to_string(), "boom");
    /// assert!(err.status().is_none());
    /// ```
    pub fn new(err: impl Into<BoxError>) -> Self {
        Error::Other(Arc::from(err.into()))
    }

    /// Creates an error that carries an HTTP status.
    pub fn status_code(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Status {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status attached to this error, if any. Only client and server
    /// error statuses count.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Decode { .. } => Some(StatusCode::BAD_REQUEST),
            Error::Status { status, .. } if status.is_client_error() || status.is_server_error() => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Attempts to downcast the wrapped error to a concrete type.
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        match self {
            Error::Other(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("<non-string panic payload>")
        };

        Error::Panic(message)
    }
}
