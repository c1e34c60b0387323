//! Request deduplication within a time window.
//!
//! Identical requests (same key) issued while a response is fresh are
//! answered from the cache without touching the chain. Concurrent identical
//! requests share one in-flight exchange. Entries expire after the TTL: a
//! background task removes them and stale entries are ignored on read.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use skein_core::{BoxFuture, Configs, Request, Response, Result};
use tokio::time::Instant;
use tracing::debug;

use super::{Middleware, Next};
use crate::synchronized::SynchronizedAccess;

type KeyFn = dyn Fn(&Request) -> String + Send + Sync;

/// Key covering method, URL, headers and a body digest.
#[must_use]
pub fn request_identity(request: &Request) -> String {
    let mut headers: Vec<(&str, &[u8])> = request
        .headers()
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_bytes()))
        .collect();
    headers.sort_unstable();

    let mut hasher = DefaultHasher::new();
    headers.hash(&mut hasher);
    request.body().hash(&mut hasher);
    format!("{} {} {:016x}", request.method(), request.url(), hasher.finish())
}

/// Configuration of the [`Throttle`] middleware.
#[derive(Clone)]
pub struct ThrottlePolicy {
    ttl: Duration,
    key: Arc<KeyFn>,
}

impl ThrottlePolicy {
    /// Deduplicate identical requests for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            key: Arc::new(request_identity),
        }
    }

    /// Custom key function.
    #[must_use]
    pub fn key(mut self, key: impl Fn(&Request) -> String + Send + Sync + 'static) -> Self {
        self.key = Arc::new(key);
        self
    }

    /// Freshness window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl fmt::Debug for ThrottlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottlePolicy")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

struct Entry {
    response: Response<Bytes>,
    stored_at: Instant,
    stamp: u64,
}

type Entries = Mutex<HashMap<String, Entry>>;

/// Middleware serving fresh cached responses for repeated requests.
pub struct Throttle {
    policy: ThrottlePolicy,
    entries: Arc<Entries>,
    stamps: AtomicU64,
    flights: SynchronizedAccess<String, Response<Bytes>>,
}

impl Throttle {
    /// Create the middleware.
    #[must_use]
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            entries: Arc::new(Mutex::new(HashMap::new())),
            stamps: AtomicU64::new(0),
            flights: SynchronizedAccess::new(),
        }
    }

    /// Number of cached entries, stale ones included.
    #[must_use]
    pub fn cached(&self) -> usize {
        lock(&self.entries).len()
    }

    fn fresh(&self, key: &str) -> Option<Response<Bytes>> {
        lock(&self.entries)
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.policy.ttl)
            .map(|entry| entry.response.clone())
    }

    fn store(&self, key: String, response: Response<Bytes>) {
        let stamp = self.stamps.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).insert(
            key.clone(),
            Entry {
                response,
                stored_at: Instant::now(),
                stamp,
            },
        );

        let entries: Weak<Entries> = Arc::downgrade(&self.entries);
        let ttl = self.policy.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(entries) = entries.upgrade() {
                let mut entries = lock(&entries);
                if entries.get(&key).is_some_and(|entry| entry.stamp == stamp) {
                    entries.remove(&key);
                }
            }
        });
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, Entry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(ThrottlePolicy::default())
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("policy", &self.policy)
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

impl Middleware for Throttle {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        let key = (self.policy.key)(&request);

        Box::pin(async move {
            if let Some(response) = self.fresh(&key) {
                debug!(key = %key, "throttled, serving cached response");
                return Ok(response);
            }

            let key_ref = &key;
            self.flights
                .with_synchronized_access(key.clone(), move || async move {
                    if let Some(response) = self.fresh(key_ref) {
                        return Ok(response);
                    }
                    let response = next.run(request, configs).await?;
                    self.store(key_ref.clone(), response.clone());
                    Ok(response)
                })
                .await
        })
    }
}
