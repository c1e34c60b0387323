//! Reactive rate limiting.
//!
//! When the server answers with a rate-limited status (429 by default), the
//! [`RateLimit`] middleware sleeps for the policy interval and repeats the
//! request. The sleep runs under single-flight for the request key, so every
//! other call targeting the same key queues behind it instead of hammering
//! the server.
//!
//! With the `quota` feature a proactive keyed quota, backed by `governor`,
//! is awaited before each call.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
#[cfg(feature = "quota")]
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use skein_core::{BoxFuture, Configs, Method, Request, Response, Result};
use tracing::debug;

use super::{Middleware, Next};
use crate::synchronized::SynchronizedAccess;

type KeyFn = dyn Fn(&Request) -> String + Send + Sync;

/// Configuration of the [`RateLimit`] middleware.
#[derive(Clone)]
pub struct RateLimitPolicy {
    interval: Duration,
    statuses: HashSet<u16>,
    max_repeat_count: u32,
    methods: Option<HashSet<Method>>,
    key: Arc<KeyFn>,
    #[cfg(feature = "quota")]
    quota: Option<Quota>,
}

impl RateLimitPolicy {
    /// Policy with the defaults: 30 s interval, `{429}`, 3 repeats, keyed by host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(30),
            statuses: HashSet::from([429]),
            max_repeat_count: 3,
            methods: None,
            key: Arc::new(|request| request.host().to_string()),
            #[cfg(feature = "quota")]
            quota: None,
        }
    }

    /// Pause before repeating a rate-limited request.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Statuses meaning "rate limited".
    #[must_use]
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Maximum number of repeats per call.
    #[must_use]
    pub const fn max_repeat_count(mut self, count: u32) -> Self {
        self.max_repeat_count = count;
        self
    }

    /// Only apply to these methods. All methods by default.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Custom key function. Calls sharing a key share the backoff.
    #[must_use]
    pub fn key(mut self, key: impl Fn(&Request) -> String + Send + Sync + 'static) -> Self {
        self.key = Arc::new(key);
        self
    }

    /// Proactive quota applied per key before each call.
    #[cfg(feature = "quota")]
    #[must_use]
    pub const fn quota(mut self, quota: Quota) -> Self {
        self.quota = Some(quota);
        self
    }

    fn applies_to(&self, method: Method) -> bool {
        self.methods
            .as_ref()
            .is_none_or(|methods| methods.contains(&method))
    }

    fn is_limited(&self, outcome: &Result<Response<Bytes>>) -> bool {
        let status = match outcome {
            Ok(response) => Some(response.status()),
            Err(err) => err.status_code(),
        };
        status.is_some_and(|status| self.statuses.contains(&status))
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("interval", &self.interval)
            .field("statuses", &self.statuses)
            .field("max_repeat_count", &self.max_repeat_count)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// Middleware backing off on rate-limited responses.
pub struct RateLimit {
    policy: RateLimitPolicy,
    backoffs: SynchronizedAccess<String, ()>,
    #[cfg(feature = "quota")]
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl RateLimit {
    /// Create the middleware.
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            #[cfg(feature = "quota")]
            limiter: policy.quota.map(RateLimiter::keyed),
            policy,
            backoffs: SynchronizedAccess::new(),
        }
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

impl fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimit")
            .field("policy", &self.policy)
            .field("backoffs", &self.backoffs)
            .finish_non_exhaustive()
    }
}

impl Middleware for RateLimit {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        if !self.policy.applies_to(request.method()) {
            return next.run(request, configs);
        }
        let key = (self.policy.key)(&request);

        Box::pin(async move {
            #[cfg(feature = "quota")]
            if let Some(limiter) = &self.limiter {
                limiter.until_key_ready(&key).await;
            }

            // Queue behind a backoff already running for this key.
            if let Some(Err(err)) = self.backoffs.wait_for_synchronized_access(&key).await {
                return Err(err);
            }

            let mut outcome = next.run(request.clone(), configs).await;
            let mut repeats = 0;
            while repeats < self.policy.max_repeat_count && self.policy.is_limited(&outcome) {
                repeats += 1;
                let interval = self.policy.interval;
                debug!(key = %key, repeat = repeats, ?interval, "rate limited, backing off");
                self.backoffs
                    .with_synchronized_access(key.clone(), || async move {
                        tokio::time::sleep(interval).await;
                        Ok(())
                    })
                    .await?;
                outcome = next.run(request.clone(), configs).await;
            }
            outcome
        })
    }
}
