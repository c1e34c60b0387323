//! Configurable, middleware-driven HTTP client engine.
//!
//! A [`Client`] is an immutable description of a call: how to build the
//! request and which cross-cutting behaviors wrap it. Executing it resolves a
//! fresh [`Configs`], builds the request, runs it through the middleware
//! onion down to a pluggable [`Transport`], validates the status and decodes
//! the body.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use skein::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     login: String,
//! }
//!
//! let github = Client::new("https://api.github.com")
//!     .header("user-agent", "skein")
//!     .retry_limit(2)
//!     .timeout(Duration::from_secs(10));
//!
//! let user: User = github.path("users/octocat").json().await?;
//! ```
//!
//! # Middleware order
//!
//! The last registered middleware is the outermost layer. See
//! [`middleware`] for the shipped middlewares and how ordering affects them.

mod caller;
mod client;
mod config;
mod listener;
pub mod middleware;
mod mock;
pub mod prelude;
mod secure_cache;
mod synchronized;
pub mod transport;

pub use caller::{Caller, ErrorHandler, ErrorHandlerKey, Http, HttpResponse, StatusValidatorKey};
pub use client::{Client, CustomStep, HeaderMode, RequestStep};
pub use config::{TransportConfig, TransportConfigBuilder};
#[cfg(feature = "metrics")]
pub use listener::MetricsListener;
pub use listener::{CallSummary, Listener, Listeners, ListenersKey, RequestId};
pub use mock::{MockPolicy, MockPolicyKey, Mocks, MocksKey};
pub use secure_cache::{InMemorySecureCache, SecureCache, SecureCacheKey};
pub use synchronized::SynchronizedAccess;
#[cfg(feature = "hyper")]
pub use transport::HyperTransport;
pub use transport::TransportKey;

// Re-export core types
pub use skein_core::{
    ArrayEncoding, Body, BodyDecoder, BodyDecoderKey, BodyEncoder, BodyEncoderKey, BoxFuture,
    ConfigKey, Configs, ContentType, Decodable, Error, FlatHeaderEncoder, FnTransport, FormDecoder,
    FormEncoder, HeaderEncoder, HeaderEncoderKey, JsonDecoder, JsonEncoder, Method, QueryEncoder,
    QueryEncoderKey, Raw, RawBytes, Request, RequestBuilder, Response, Result, Serializer, Text,
    Transport, Unit, UrlQueryEncoder, from_json, from_value, to_form, to_json, to_query_string,
    to_value,
};

// Re-export http types for status codes and headers
pub use skein_core::{HeaderMap, StatusCode, header};

pub use url;
