//! Keyed single-flight coordination.
//!
//! [`SynchronizedAccess`] guarantees that for a given key at most one producer
//! runs at a time. Callers arriving while a producer is running wait for it
//! and receive a clone of its outcome, error included. Nothing is cached: once
//! the outcome is delivered the key is free again.
//!
//! Token refresh, rate-limit backoff and throttling all build on this type.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use skein_core::Result;
use tokio::sync::watch;

type Ticket<V> = watch::Receiver<Option<Result<V>>>;

/// Registry of in-flight producers keyed by `K`, sharing outcomes of type `V`.
pub struct SynchronizedAccess<K, V> {
    inflight: Mutex<HashMap<K, Ticket<V>>>,
}

impl<K, V> SynchronizedAccess<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a running producer.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if a producer is running for `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Waits for the producer currently running for `key`, if any.
    ///
    /// Returns `None` when nothing is in flight, or when the producer was
    /// cancelled before it delivered an outcome. Never starts a producer.
    pub async fn wait_for_synchronized_access(&self, key: &K) -> Option<Result<V>> {
        let mut ticket = self.lock().get(key).cloned()?;
        Self::wait(&mut ticket).await
    }

    /// Runs `producer` for `key` unless one is already running, in which case
    /// the running producer's outcome is awaited and returned instead.
    ///
    /// If the running producer is cancelled, waiters compete again and one of
    /// them runs its own producer.
    pub async fn with_synchronized_access<F, Fut>(&self, key: K, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let sender = loop {
            match self.claim(&key) {
                Ok(sender) => break sender,
                Err(mut ticket) => {
                    if let Some(outcome) = Self::wait(&mut ticket).await {
                        return outcome;
                    }
                }
            }
        };

        let release = Release {
            registry: self,
            key,
            sender,
        };
        let outcome = producer().await;
        release.deliver(outcome.clone());
        outcome
    }

    fn claim(&self, key: &K) -> std::result::Result<watch::Sender<Option<Result<V>>>, Ticket<V>> {
        let mut inflight = self.lock();
        if let Some(ticket) = inflight.get(key) {
            return Err(ticket.clone());
        }
        let (sender, ticket) = watch::channel(None);
        inflight.insert(key.clone(), ticket);
        Ok(sender)
    }

    async fn wait(ticket: &mut Ticket<V>) -> Option<Result<V>> {
        match ticket.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            // Sender dropped without an outcome: the producer was cancelled.
            Err(_) => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Ticket<V>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for SynchronizedAccess<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for SynchronizedAccess<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedAccess")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Frees the key when the producer finishes or its future is dropped.
struct Release<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    registry: &'a SynchronizedAccess<K, V>,
    key: K,
    sender: watch::Sender<Option<Result<V>>>,
}

impl<K, V> Release<'_, K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn deliver(self, outcome: Result<V>) {
        self.sender.send_replace(Some(outcome));
    }
}

impl<K, V> Drop for Release<'_, K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}
