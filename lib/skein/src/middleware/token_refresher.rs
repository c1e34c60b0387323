//! Access token lifecycle middleware.
//!
//! Per call, the [`TokenRefresher`]:
//!
//! 1. loads the cached token, bootstrapping one with the optional token
//!    request when the cache is empty;
//! 2. refreshes it first when it is already past its expiry;
//! 3. applies it with the configured [`AuthStrategy`] and runs the chain;
//! 4. on an "expired" status (401 by default), refreshes once and retries.
//!
//! Bootstrap is single-flight per target host and refresh is single-flight per
//! stale token value, so a burst of calls holding the same expired token
//! triggers one refresh. New tokens reach the [`SecureCache`] before any
//! waiter is released.
//!
//! Tokens this refresher stored are also kept in memory and read before the
//! cache, so a caller arriving during a multi-key write sees a consistent
//! token and expiry.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderValue};
use skein_core::{BoxFuture, Configs, Error, Request, Response, Result, parse_header};
use tracing::debug;

use super::{AuthEnabledKey, Middleware, Next};
use crate::secure_cache::{SecureCache, SecureCacheKey};
use crate::synchronized::SynchronizedAccess;

/// Tokens returned by a token request or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    /// The access token.
    pub access_token: String,
    /// A new refresh token, if the server rotated it.
    pub refresh_token: Option<String>,
    /// Expiry of the access token, `None` if it does not expire.
    pub expires_at: Option<SystemTime>,
}

impl Tokens {
    /// Access token without refresh token or expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Set the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set an absolute expiry.
    #[must_use]
    pub const fn expires_at(mut self, at: SystemTime) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Set the expiry relative to now.
    #[must_use]
    pub fn expires_in(self, lifetime: Duration) -> Self {
        self.expires_at(SystemTime::now() + lifetime)
    }
}

type ApplyFn = dyn Fn(&mut Request, &str) -> Result<()> + Send + Sync;

/// How a token is attached to a request.
#[derive(Clone)]
pub struct AuthStrategy(Arc<ApplyFn>);

impl AuthStrategy {
    /// `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer() -> Self {
        Self::custom(|request, token| {
            let mut value = HeaderValue::try_from(format!("Bearer {token}"))
                .map_err(|e| Error::request_build(format!("invalid access token: {e}")))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
            Ok(())
        })
    }

    /// The raw token in the given header.
    pub fn header(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::custom(move |request, token| {
            let (name, mut value) = parse_header(&name, token)?;
            value.set_sensitive(true);
            request.headers_mut().insert(name, value);
            Ok(())
        })
    }

    /// Any request mutation.
    pub fn custom(
        apply: impl Fn(&mut Request, &str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(apply))
    }

    /// Attach `token` to `request`.
    pub fn apply(&self, request: &mut Request, token: &str) -> Result<()> {
        (self.0)(request, token)
    }
}

impl Default for AuthStrategy {
    fn default() -> Self {
        Self::bearer()
    }
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthStrategy(..)")
    }
}

type RequestTokenFn = dyn Fn(Configs) -> BoxFuture<'static, Result<Tokens>> + Send + Sync;
type RefreshFn =
    dyn Fn(Option<String>, Configs) -> BoxFuture<'static, Result<Tokens>> + Send + Sync;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<SystemTime>,
}

impl CachedToken {
    fn is_valid(&self, now: SystemTime) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Middleware keeping a valid access token on every request.
///
/// # Example
///
/// ```ignore
/// use skein::{InMemorySecureCache, middleware::{TokenRefresher, Tokens}};
///
/// let refresher = TokenRefresher::builder(InMemorySecureCache::new(), |refresh_token, _configs| async move {
///     let tokens = exchange(refresh_token).await?;
///     Ok(Tokens::new(tokens.access).with_refresh_token(tokens.refresh))
/// })
/// .build();
/// ```
pub struct TokenRefresher {
    cache: Arc<dyn SecureCache>,
    expired_statuses: HashSet<u16>,
    request_token: Option<Arc<RequestTokenFn>>,
    refresh: Arc<RefreshFn>,
    strategy: AuthStrategy,
    bootstraps: SynchronizedAccess<String, String>,
    refreshes: SynchronizedAccess<String, String>,
    current: Mutex<Option<CachedToken>>,
}

impl TokenRefresher {
    /// Start a builder from the cache and the refresh operation.
    ///
    /// `refresh` receives the cached refresh token, if any, and the call
    /// configuration.
    pub fn builder<C, F, Fut>(cache: C, refresh: F) -> TokenRefresherBuilder
    where
        C: SecureCache,
        F: Fn(Option<String>, Configs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Tokens>> + Send + 'static,
    {
        TokenRefresherBuilder {
            cache: Arc::new(cache),
            expired_statuses: HashSet::from([401]),
            request_token: None,
            refresh: Arc::new(move |refresh_token, configs| {
                Box::pin(refresh(refresh_token, configs))
            }),
            strategy: AuthStrategy::default(),
        }
    }

    /// The backing cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn SecureCache> {
        &self.cache
    }

    fn current(&self) -> MutexGuard<'_, Option<CachedToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn cached_token(&self) -> Result<Option<CachedToken>> {
        let current = self.current().clone();
        if current.is_some() {
            return Ok(current);
        }
        let Some(access_token) = self.cache.load(&SecureCacheKey::AccessToken).await? else {
            return Ok(None);
        };
        let expires_at = self
            .cache
            .load(&SecureCacheKey::ExpiryDate)
            .await?
            .and_then(|millis| millis.parse::<u64>().ok())
            .map(|millis| UNIX_EPOCH + Duration::from_millis(millis));
        Ok(Some(CachedToken {
            access_token,
            expires_at,
        }))
    }

    async fn persist(&self, tokens: &Tokens) -> Result<()> {
        *self.current() = Some(CachedToken {
            access_token: tokens.access_token.clone(),
            expires_at: tokens.expires_at,
        });
        let stored = self.store(tokens).await;
        if stored.is_err() {
            *self.current() = None;
        }
        stored
    }

    async fn store(&self, tokens: &Tokens) -> Result<()> {
        self.cache
            .save(&SecureCacheKey::AccessToken, tokens.access_token.clone())
            .await?;
        if let Some(refresh_token) = &tokens.refresh_token {
            self.cache
                .save(&SecureCacheKey::RefreshToken, refresh_token.clone())
                .await?;
        }
        match tokens.expires_at {
            Some(at) => {
                let millis = at
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_millis())
                    .unwrap_or_default();
                self.cache
                    .save(&SecureCacheKey::ExpiryDate, millis.to_string())
                    .await
            }
            None => self.cache.remove(&SecureCacheKey::ExpiryDate).await,
        }
    }

    async fn bootstrap(&self, host: String, configs: &Configs) -> Result<String> {
        let Some(request_token) = &self.request_token else {
            return Err(Error::TokenNotFound);
        };

        self.bootstraps
            .with_synchronized_access(host, || async move {
                // Someone may have stored a token while this caller queued.
                if let Some(cached) = self.cached_token().await?
                    && cached.is_valid(SystemTime::now())
                {
                    return Ok(cached.access_token);
                }
                debug!("requesting access token");
                let tokens = request_token(configs.clone()).await?;
                self.persist(&tokens).await?;
                Ok(tokens.access_token)
            })
            .await
    }

    async fn refresh(&self, stale: String, configs: &Configs) -> Result<String> {
        self.refreshes
            .with_synchronized_access(stale.clone(), move || async move {
                if let Some(cached) = self.cached_token().await?
                    && cached.access_token != stale
                    && cached.is_valid(SystemTime::now())
                {
                    return Ok(cached.access_token);
                }
                debug!("refreshing access token");
                let refresh_token = self.cache.load(&SecureCacheKey::RefreshToken).await?;
                let tokens = (self.refresh)(refresh_token, configs.clone()).await?;
                self.persist(&tokens).await?;
                Ok(tokens.access_token)
            })
            .await
    }

    async fn send_with(
        &self,
        request: &Request,
        token: &str,
        configs: &Configs,
        next: Next<'_>,
    ) -> Result<Response<Bytes>> {
        let mut request = request.clone();
        self.strategy.apply(&mut request, token)?;
        next.run(request, configs).await
    }

    fn is_expired(&self, outcome: &Result<Response<Bytes>>) -> bool {
        let status = match outcome {
            Ok(response) => Some(response.status()),
            Err(err) => err.status_code(),
        };
        status.is_some_and(|status| self.expired_statuses.contains(&status))
    }
}

impl fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("expired_statuses", &self.expired_statuses)
            .field("bootstrap", &self.request_token.is_some())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl Middleware for TokenRefresher {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        if !configs.get::<AuthEnabledKey>() {
            return next.run(request, configs);
        }

        Box::pin(async move {
            let token = match self.cached_token().await? {
                None => self.bootstrap(request.host().to_string(), configs).await?,
                Some(cached) if cached.is_valid(SystemTime::now()) => cached.access_token,
                Some(cached) => self.refresh(cached.access_token, configs).await?,
            };

            let outcome = self.send_with(&request, &token, configs, next).await;
            if !self.is_expired(&outcome) {
                return outcome;
            }

            debug!(url = %request.url(), "access token rejected, refreshing once");
            let token = self.refresh(token, configs).await?;
            self.send_with(&request, &token, configs, next).await
        })
    }
}

/// Builder for [`TokenRefresher`].
pub struct TokenRefresherBuilder {
    cache: Arc<dyn SecureCache>,
    expired_statuses: HashSet<u16>,
    request_token: Option<Arc<RequestTokenFn>>,
    refresh: Arc<RefreshFn>,
    strategy: AuthStrategy,
}

impl TokenRefresherBuilder {
    /// Operation fetching a first token when the cache is empty.
    #[must_use]
    pub fn request_token<F, Fut>(mut self, request_token: F) -> Self
    where
        F: Fn(Configs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Tokens>> + Send + 'static,
    {
        self.request_token = Some(Arc::new(move |configs| Box::pin(request_token(configs))));
        self
    }

    /// Statuses meaning "token expired" (default: 401).
    #[must_use]
    pub fn expired_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.expired_statuses = statuses.into_iter().collect();
        self
    }

    /// How the token is attached (default: bearer).
    #[must_use]
    pub fn strategy(mut self, strategy: AuthStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Build the middleware.
    #[must_use]
    pub fn build(self) -> TokenRefresher {
        TokenRefresher {
            cache: self.cache,
            expired_statuses: self.expired_statuses,
            request_token: self.request_token,
            refresh: self.refresh,
            strategy: self.strategy,
            bootstraps: SynchronizedAccess::new(),
            refreshes: SynchronizedAccess::new(),
            current: Mutex::new(None),
        }
    }
}

impl fmt::Debug for TokenRefresherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRefresherBuilder")
            .field("expired_statuses", &self.expired_statuses)
            .finish_non_exhaustive()
    }
}
