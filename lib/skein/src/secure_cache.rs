//! Storage boundary for credentials.
//!
//! The token refresher reads and writes tokens through a [`SecureCache`].
//! Platform keychains or encrypted stores plug in by implementing the trait.
//! [`InMemorySecureCache`] keeps values in process memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use skein_core::{BoxFuture, Result};

/// Name under which a credential is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SecureCacheKey {
    /// `access_token`
    AccessToken,
    /// `refresh_token`
    RefreshToken,
    /// `expiry_date`, stored as unix milliseconds.
    ExpiryDate,
    /// Application-defined entry.
    Custom(String),
}

impl SecureCacheKey {
    /// Storage name of the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::ExpiryDate => "expiry_date",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for SecureCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous, fallible credential store.
pub trait SecureCache: Send + Sync + 'static {
    /// Read a value.
    fn load<'a>(&'a self, key: &'a SecureCacheKey) -> BoxFuture<'a, Result<Option<String>>>;

    /// Write a value, replacing any previous one.
    fn save<'a>(&'a self, key: &'a SecureCacheKey, value: String) -> BoxFuture<'a, Result<()>>;

    /// Delete a value. Deleting a missing key succeeds.
    fn remove<'a>(&'a self, key: &'a SecureCacheKey) -> BoxFuture<'a, Result<()>>;
}

/// Process-memory [`SecureCache`]. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemorySecureCache {
    entries: Arc<Mutex<HashMap<SecureCacheKey, String>>>,
}

impl InMemorySecureCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous write, for seeding.
    pub fn insert(&self, key: SecureCacheKey, value: impl Into<String>) {
        self.lock().insert(key, value.into());
    }

    /// Synchronous read.
    #[must_use]
    pub fn get(&self, key: &SecureCacheKey) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SecureCacheKey, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for InMemorySecureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.lock().keys().map(ToString::to_string).collect();
        keys.sort_unstable();
        f.debug_struct("InMemorySecureCache")
            .field("keys", &keys)
            .finish()
    }
}

impl SecureCache for InMemorySecureCache {
    fn load<'a>(&'a self, key: &'a SecureCacheKey) -> BoxFuture<'a, Result<Option<String>>> {
        let value = self.get(key);
        Box::pin(std::future::ready(Ok(value)))
    }

    fn save<'a>(&'a self, key: &'a SecureCacheKey, value: String) -> BoxFuture<'a, Result<()>> {
        self.insert(key.clone(), value);
        Box::pin(std::future::ready(Ok(())))
    }

    fn remove<'a>(&'a self, key: &'a SecureCacheKey) -> BoxFuture<'a, Result<()>> {
        self.lock().remove(key);
        Box::pin(std::future::ready(Ok(())))
    }
}
