//! Error types for skein.

use std::time::Duration;

use derive_more::{Display, Error, From};

/// Main error type for skein operations.
///
/// The type is `Clone` so that a single outcome can be handed to every caller
/// waiting on the same in-flight operation.
#[derive(Debug, Clone, Display, Error, From)]
pub enum Error {
    /// The request descriptor could not be built. Never retried.
    #[display("request build error: {_0}")]
    #[from(skip)]
    RequestBuild(#[error(not(source))] String),

    /// Network/connection level failure.
    #[display("transport error: {_0}")]
    #[from(skip)]
    Transport(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// The response status was rejected by a validator.
    #[display("response status {status} rejected")]
    #[from(skip)]
    StatusValidation {
        /// HTTP status code.
        status: u16,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// The response body could not be decoded.
    #[display("decode error at '{path}': {message}")]
    #[from(skip)]
    Decode {
        /// Path to the failing field (e.g. `"user.address.city"`), empty for syntax errors.
        path: String,
        /// Error message.
        message: String,
    },

    /// A value could not be encoded into a body, query or headers.
    #[display("encode error: {_0}")]
    #[from(skip)]
    Encode(#[error(not(source))] String),

    /// The operation exceeded its deadline.
    #[display("request timed out after {_0:?}")]
    #[from(skip)]
    Timeout(#[error(not(source))] Duration),

    /// Authentication is required but no token is cached and none can be requested.
    #[display("no access token available")]
    #[from(skip)]
    TokenNotFound,

    /// The mock policy requires a mock value and none is registered.
    #[display("mock required but none registered for `{type_name}`")]
    #[from(skip)]
    MockMissing {
        /// Name of the missing mock type.
        type_name: &'static str,
    },

    /// The secure token cache failed.
    #[display("secure cache error: {_0}")]
    #[from(skip)]
    SecureCache(#[error(not(source))] String),

    /// The operation was cancelled. Never retried.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// An error wrapped with extra context, e.g. by an error handler.
    #[display("{context}: {source}")]
    #[from(skip)]
    Context {
        /// Context message.
        context: String,
        /// The wrapped error.
        source: Box<Error>,
    },
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a request build error.
    #[must_use]
    pub fn request_build(message: impl Into<String>) -> Self {
        Self::RequestBuild(message.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a status validation error without body.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self::StatusValidation { status, body: None }
    }

    /// Create a status validation error with body.
    #[must_use]
    pub const fn status_with_body(status: u16, body: bytes::Bytes) -> Self {
        Self::StatusValidation {
            status,
            body: Some(body),
        }
    }

    /// Create a decode error with path context.
    #[must_use]
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an encode error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create a secure cache error.
    #[must_use]
    pub fn secure_cache(message: impl Into<String>) -> Self {
        Self::SecureCache(message.into())
    }

    /// Wrap this error with a context message.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`Error::Context`] layers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout(_))
    }

    /// Returns `true` for network level failures (transport and TLS).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.root(), Self::Transport(_) | Self::Tls(_))
    }

    /// Returns `true` if the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    /// Returns `true` if the request could not be built.
    #[must_use]
    pub fn is_request_build(&self) -> bool {
        matches!(
            self.root(),
            Self::RequestBuild(_) | Self::Encode(_) | Self::InvalidUrl(_)
        )
    }

    /// Returns the HTTP status code if this is a status validation error.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            Self::StatusValidation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns the response body if this is a status error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self.root() {
            Self::StatusValidation { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the error body as JSON.
    ///
    /// Returns `None` if there is no body or this is not a status error.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}
