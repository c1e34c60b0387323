//! Static credential middlewares.
//!
//! [`BearerAuth`] and [`BasicAuth`] set the `Authorization` header on every
//! request passing through them. Both step aside when [`AuthEnabledKey`] is
//! `false` for the call.

use std::sync::Arc;

#[cfg(feature = "basic-auth")]
use base64::Engine;
use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderValue};
use skein_core::{BoxFuture, ConfigKey, Configs, Error, Request, Response, Result};

use super::{Middleware, Next};

/// Slot switching authentication middlewares on or off for a call.
pub struct AuthEnabledKey;

impl ConfigKey for AuthEnabledKey {
    type Value = bool;

    fn default_value() -> bool {
        true
    }
}

/// Set `credentials` as the `Authorization` header, unless auth is disabled,
/// then continue down the chain.
fn with_authorization<'a>(
    credentials: &str,
    mut request: Request,
    configs: &'a Configs,
    next: Next<'a>,
) -> BoxFuture<'a, Result<Response<Bytes>>> {
    if configs.get::<AuthEnabledKey>() {
        let header = HeaderValue::try_from(credentials)
            .map_err(|e| Error::request_build(format!("invalid authorization header: {e}")));
        match header {
            Ok(mut header) => {
                header.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, header);
            }
            Err(err) => return Box::pin(std::future::ready(Err(err))),
        }
    }
    next.run(request, configs)
}

/// Adds `Authorization: Bearer <token>`.
///
/// # Example
///
/// ```ignore
/// use skein::Client;
///
/// let client = Client::new(base).bearer_auth("my-secret-token");
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth {
    credentials: Arc<str>,
}

impl BearerAuth {
    /// Create the middleware for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credentials: Arc::from(format!("Bearer {}", token.into())),
        }
    }
}

impl Middleware for BearerAuth {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        with_authorization(&self.credentials, request, configs, next)
    }
}

/// Adds `Authorization: Basic <base64(user:pass)>`.
#[cfg(feature = "basic-auth")]
#[derive(Debug, Clone)]
pub struct BasicAuth {
    credentials: Arc<str>,
}

#[cfg(feature = "basic-auth")]
impl BasicAuth {
    /// Create the middleware with the given username and password.
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        Self {
            credentials: Arc::from(format!("Basic {encoded}")),
        }
    }
}

#[cfg(feature = "basic-auth")]
impl Middleware for BasicAuth {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        with_authorization(&self.credentials, request, configs, next)
    }
}

#[cfg(test)]
mod tests {
    use skein_core::{FnTransport, Method};

    use super::*;

    fn echo_authorization() -> impl skein_core::Transport {
        FnTransport::new(|request: Request, _configs: Configs| {
            let seen = request.header("authorization").unwrap_or("none").to_string();
            async move { Ok::<_, Error>(Response::from_status(200, seen)) }
        })
    }

    fn request() -> Request {
        Request::new(Method::Get, "https://example.com/me".parse().expect("url"))
    }

    #[tokio::test]
    async fn bearer_sets_header() {
        let transport = echo_authorization();
        let response = BearerAuth::new("test-token")
            .handle(request(), &Configs::new(), Next::new(&[], &transport))
            .await
            .expect("ok");
        assert_eq!(response.body().as_ref(), b"Bearer test-token");
    }

    #[tokio::test]
    async fn disabled_auth_leaves_request_untouched() {
        let transport = echo_authorization();
        let configs = Configs::new().with::<AuthEnabledKey>(false);
        let response = BearerAuth::new("test-token")
            .handle(request(), &configs, Next::new(&[], &transport))
            .await
            .expect("ok");
        assert_eq!(response.body().as_ref(), b"none");
    }

    #[tokio::test]
    async fn invalid_token_is_a_build_error() {
        let transport = echo_authorization();
        let err = BearerAuth::new("line\nbreak")
            .handle(request(), &Configs::new(), Next::new(&[], &transport))
            .await
            .expect_err("invalid");
        assert!(err.is_request_build());
    }

    #[cfg(feature = "basic-auth")]
    #[test]
    fn basic_auth_encodes_correctly() {
        // "user:pass" -> "dXNlcjpwYXNz"
        let auth = BasicAuth::new("user", "pass");
        assert_eq!(&*auth.credentials, "Basic dXNlcjpwYXNz");
    }

    #[cfg(feature = "basic-auth")]
    #[tokio::test]
    async fn basic_auth_honors_disabled_auth() {
        let transport = echo_authorization();
        let configs = Configs::new().with::<AuthEnabledKey>(false);
        let response = BasicAuth::new(String::from("user"), "pass")
            .handle(request(), &configs, Next::new(&[], &transport))
            .await
            .expect("ok");
        assert_eq!(response.body().as_ref(), b"none");
    }

    #[cfg(feature = "basic-auth")]
    #[tokio::test]
    async fn basic_auth_sets_header() {
        let transport = echo_authorization();
        let response = BasicAuth::new("user", "pass")
            .handle(request(), &Configs::new(), Next::new(&[], &transport))
            .await
            .expect("ok");
        assert_eq!(response.body().as_ref(), b"Basic dXNlcjpwYXNz");
    }
}
