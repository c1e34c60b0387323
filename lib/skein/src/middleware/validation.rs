//! Status validation.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use skein_core::{BoxFuture, Configs, Error, Request, Response, Result};

use super::{Middleware, Next};

/// Accepts or rejects a response by status code.
#[derive(Clone)]
pub struct StatusValidator(Arc<dyn Fn(u16) -> bool + Send + Sync>);

impl StatusValidator {
    /// Custom predicate returning `true` for accepted statuses.
    pub fn new(accept: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(accept))
    }

    /// Accept 2xx statuses.
    #[must_use]
    pub fn success() -> Self {
        Self::new(|status| (200..300).contains(&status))
    }

    /// Accept exactly the listed statuses.
    pub fn accept(statuses: impl IntoIterator<Item = u16>) -> Self {
        let statuses: Vec<u16> = statuses.into_iter().collect();
        Self::new(move |status| statuses.contains(&status))
    }

    /// Accept everything.
    #[must_use]
    pub fn any() -> Self {
        Self::new(|_| true)
    }

    /// Returns `true` if `status` is accepted.
    #[must_use]
    pub fn is_valid(&self, status: u16) -> bool {
        (self.0)(status)
    }

    /// Fails with [`Error::StatusValidation`], carrying the body, when the
    /// status is rejected.
    pub fn validate(&self, response: &Response<Bytes>) -> Result<()> {
        if self.is_valid(response.status()) {
            Ok(())
        } else {
            Err(Error::status_with_body(
                response.status(),
                response.body().clone(),
            ))
        }
    }
}

impl Default for StatusValidator {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Debug for StatusValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusValidator(..)")
    }
}

/// Turns rejected responses into errors at its position in the chain.
///
/// Middlewares registered after this one see the error instead of the
/// response.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    validator: StatusValidator,
}

impl Validation {
    /// Create the middleware.
    #[must_use]
    pub const fn new(validator: StatusValidator) -> Self {
        Self { validator }
    }
}

impl Middleware for Validation {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        Box::pin(async move {
            let response = next.run(request, configs).await?;
            self.validator.validate(&response)?;
            Ok(response)
        })
    }
}
