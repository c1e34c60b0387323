//! The transport boundary.
//!
//! A [`Transport`] performs one network round trip. It sits at the end of the
//! middleware chain and never sees retries, auth or caching.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
pub use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::{Configs, Request, Response, Result};

/// Sends a request and returns the raw response.
///
/// Implementations report connectivity failures as [`crate::Error::Transport`]
/// and must return non-2xx statuses as regular responses.
pub trait Transport: Send + Sync + 'static {
    /// Perform the round trip.
    fn send<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
    ) -> BoxFuture<'a, Result<Response<Bytes>>>;
}

/// A [`Transport`] backed by a closure.
///
/// The closure receives an owned copy of the call configuration, so the
/// returned future does not borrow anything.
///
/// ```
/// use std::sync::Arc;
///
/// use skein_core::{Configs, Error, FnTransport, Request, Response, Transport};
///
/// let transport: Arc<dyn Transport> =
///     Arc::new(FnTransport::new(|_request: Request, _configs: Configs| async {
///         Ok::<_, Error>(Response::from_status(200, "ok"))
///     }));
/// # let _ = transport;
/// ```
pub struct FnTransport<F> {
    f: F,
}

impl<F> FnTransport<F> {
    /// Wrap a closure.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnTransport<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransport").finish_non_exhaustive()
    }
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Request, Configs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>>> + Send + 'static,
{
    fn send<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        (self.f)(request, configs.clone()).boxed()
    }
}
