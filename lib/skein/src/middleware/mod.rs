//! Middleware chain for skein calls.
//!
//! A [`Middleware`] receives the request, the call configuration and a
//! [`Next`] continuation covering everything registered before it. The chain
//! ends at the configured [`Transport`].
//!
//! Middlewares are applied in reverse order: the last one registered is the
//! outermost layer. It sees the request first and the outcome last. A retry
//! registered after a validation middleware therefore retries the validator's
//! failures, one registered before it does not.
//!
//! # Available Middlewares
//!
//! - [`Retry`] - Re-runs the continuation on failures matching a condition
//! - [`Timeout`] - Races the continuation against a deadline
//! - [`TokenRefresher`] - Applies, bootstraps and refreshes access tokens
//! - [`RateLimit`] - Backs off per key on rate-limited statuses
//! - [`Throttle`] - Deduplicates identical requests within a TTL
//! - [`BearerAuth`] - Adds `Authorization: Bearer <token>` header
//! - [`BasicAuth`] - Adds `Authorization: Basic <base64>` header
//! - [`Validation`] - Rejects responses with an order-aware status check
//! - [`Logging`] - Logs each pass using `tracing`
//! - [`Metrics`] - Records HTTP metrics (counters, histograms)
//!
//! # Example
//!
//! ```ignore
//! use skein::Client;
//! use std::time::Duration;
//!
//! let client = Client::new(base)
//!     .bearer_auth("my-token")
//!     .retry_limit(3)
//!     .timeout(Duration::from_secs(5));
//! ```

mod auth;
mod logging;
#[cfg(feature = "metrics")]
pub(crate) mod metrics;
mod rate_limit;
mod retry;
mod throttle;
mod timeout;
mod token_refresher;
mod validation;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use skein_core::{BoxFuture, ConfigKey, Configs, Request, Response, Result, Transport};

#[cfg(feature = "basic-auth")]
pub use auth::BasicAuth;
pub use auth::{AuthEnabledKey, BearerAuth};
pub use logging::{LogLevel, LogLevelKey, Logging};
#[cfg(feature = "metrics")]
pub use metrics::Metrics;
pub use rate_limit::{RateLimit, RateLimitPolicy};
pub use retry::{Backoff, Retry, RetryCondition, RetryPolicy};
pub use throttle::{Throttle, ThrottlePolicy, request_identity};
pub use timeout::Timeout;
pub use token_refresher::{AuthStrategy, TokenRefresher, TokenRefresherBuilder, Tokens};
pub use validation::{StatusValidator, Validation};

/// One layer of the call onion.
pub trait Middleware: Send + Sync + 'static {
    /// Handle `request`, usually by calling `next.run` zero or more times.
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>>;

    /// Name shown in debug output.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Continuation over the middlewares registered before the current one.
///
/// `Next` is `Copy`, so a middleware may run it several times.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Continuation over `middlewares`, ending at `transport`.
    #[must_use]
    pub fn new(middlewares: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self {
            middlewares,
            transport,
        }
    }

    /// Run the rest of the chain.
    pub fn run(
        self,
        request: Request,
        configs: &'a Configs,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        match self.middlewares.split_last() {
            Some((current, inner)) => current.handle(
                request,
                configs,
                Next {
                    middlewares: inner,
                    transport: self.transport,
                },
            ),
            None => self.transport.send(request, configs),
        }
    }

    /// Number of middlewares left before the transport.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.middlewares.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable list of middlewares.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<[Arc<dyn Middleware>]>,
}

impl MiddlewareChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new chain with `middleware` as the outermost layer.
    #[must_use]
    pub fn register(&self, middleware: impl Middleware) -> Self {
        self.register_arc(Arc::new(middleware))
    }

    /// Like [`MiddlewareChain::register`] for an already shared middleware.
    #[must_use]
    pub fn register_arc(&self, middleware: Arc<dyn Middleware>) -> Self {
        let middlewares = self
            .middlewares
            .iter()
            .cloned()
            .chain(std::iter::once(middleware))
            .collect();
        Self { middlewares }
    }

    /// Run `request` through every layer and then `transport`.
    pub fn execute<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        transport: &'a dyn Transport,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        Next::new(&self.middlewares, transport).run(request, configs)
    }

    /// Number of registered middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Middleware names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Slot holding the middleware chain of a call.
pub struct MiddlewaresKey;

impl ConfigKey for MiddlewaresKey {
    type Value = MiddlewareChain;

    fn default_value() -> Self::Value {
        MiddlewareChain::new()
    }
}
