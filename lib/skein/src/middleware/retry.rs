//! Retry middleware.
//!
//! Re-runs the rest of the chain while the outcome satisfies a
//! [`RetryCondition`] and the attempt limit is not reached.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use skein_core::{BoxFuture, Configs, Request, Response, Result};
use tracing::debug;

use super::{Middleware, Next};

/// Decides whether an outcome is worth another attempt.
#[derive(Clone)]
pub struct RetryCondition(Arc<dyn Fn(&Request, &Result<Response<Bytes>>) -> bool + Send + Sync>);

impl RetryCondition {
    /// Custom condition.
    pub fn new(
        condition: impl Fn(&Request, &Result<Response<Bytes>>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(condition))
    }

    /// Retry every outcome, success included.
    #[must_use]
    pub fn always() -> Self {
        Self::new(|_, _| true)
    }

    /// The default condition.
    ///
    /// Only safe methods are retried, on:
    /// - Transport and timeout errors
    /// - 5xx server errors
    /// - 408 Request Timeout and 429 Too Many Requests
    ///
    /// Statuses count both as returned responses and as
    /// [`skein_core::Error::StatusValidation`] errors.
    #[must_use]
    pub fn request_failed() -> Self {
        Self::new(|request, outcome| {
            if !request.method().is_safe() {
                return false;
            }
            match outcome {
                Ok(response) => is_retryable_status(response.status()),
                Err(err) => {
                    err.is_transport()
                        || err.is_timeout()
                        || err.status_code().is_some_and(is_retryable_status)
                }
            }
        })
    }

    /// Evaluate the condition.
    #[must_use]
    pub fn matches(&self, request: &Request, outcome: &Result<Response<Bytes>>) -> bool {
        (self.0)(request, outcome)
    }
}

impl Default for RetryCondition {
    fn default() -> Self {
        Self::request_failed()
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryCondition(..)")
    }
}

const fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

/// Delay before each new attempt.
#[derive(Clone)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound.
        max: Duration,
    },
    /// Delay computed from the zero-based attempt number.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    /// Delay after the given zero-based attempt.
    #[must_use]
    pub fn interval(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, max } => {
                base.saturating_mul(2u32.saturating_pow(attempt)).min(*max)
            }
            Self::Custom(f) => f(attempt),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Exponential { base, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Retry policy: how many attempts, how long to wait, and when.
///
/// # Example
///
/// ```ignore
/// use skein::middleware::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(Some(5))
///     .backoff(Backoff::Fixed(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    limit: Option<u32>,
    backoff: Backoff,
    condition: RetryCondition,
}

impl RetryPolicy {
    /// Policy allowing `limit` retries (`None` for unbounded).
    #[must_use]
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            backoff: Backoff::default(),
            condition: RetryCondition::default(),
        }
    }

    /// Set the backoff.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the condition.
    #[must_use]
    pub fn condition(mut self, condition: RetryCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Maximum number of retries, `None` when unbounded.
    #[must_use]
    pub const fn limit(&self) -> Option<u32> {
        self.limit
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Some(3))
    }
}

/// Middleware applying a [`RetryPolicy`].
///
/// A [`skein_core::Error::Cancelled`] outcome is returned at once whatever
/// the condition says.
#[derive(Debug, Clone, Default)]
pub struct Retry {
    policy: RetryPolicy,
}

impl Retry {
    /// Create the middleware.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl Middleware for Retry {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                let outcome = next.run(request.clone(), configs).await;
                if matches!(&outcome, Err(err) if err.is_cancelled()) {
                    return outcome;
                }

                let within_limit = self.policy.limit.is_none_or(|limit| attempt < limit);
                if !within_limit || !self.policy.condition.matches(&request, &outcome) {
                    return outcome;
                }

                let delay = self.policy.backoff.interval(attempt);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    url = %request.url(),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}
