//! Deadline for the rest of the chain.

use std::time::Duration;

use bytes::Bytes;
use skein_core::{BoxFuture, Configs, Error, Request, Response, Result};

use super::{Middleware, Next};

/// Fails with [`Error::Timeout`] when the rest of the chain takes longer than
/// the configured duration. The pending work is dropped before returning.
///
/// A zero duration fails at once without running anything.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Create the middleware.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured deadline.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

impl Middleware for Timeout {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        let duration = self.duration;
        Box::pin(async move {
            if duration.is_zero() {
                return Err(Error::Timeout(duration));
            }
            tokio::time::timeout(duration, next.run(request, configs))
                .await
                .map_err(|_| Error::Timeout(duration))?
        })
    }
}
