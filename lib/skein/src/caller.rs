//! Result shaping around one round trip.
//!
//! A [`Caller`] runs the request through the middleware chain and the
//! transport, then shapes the decoded value into its output type. [`Http`]
//! yields the value alone, [`HttpResponse`] keeps status and headers.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use skein_core::{BoxFuture, ConfigKey, Configs, Error, Request, Response, Result};

use crate::middleware::{MiddlewaresKey, StatusValidator};
use crate::transport::TransportKey;

/// Performs the round trip of a call and shapes its result.
pub trait Caller: Send + Sync {
    /// What a call returns for a decoded value of type `T`.
    type Output<T>;

    /// Run `request` through the configured middleware chain and transport.
    fn round_trip<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        Box::pin(async move {
            let chain = configs.get::<MiddlewaresKey>();
            let transport = configs.get::<TransportKey>();
            chain.execute(request, configs, transport.as_ref()).await
        })
    }

    /// Shape a value decoded from a response with `status` and `headers`.
    fn finish<T>(&self, status: u16, headers: HeaderMap, value: T) -> Self::Output<T>;

    /// Shape a mock value.
    fn mock<T>(&self, value: T) -> Self::Output<T>;
}

/// Returns the decoded value only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Http;

impl Caller for Http {
    type Output<T> = T;

    fn finish<T>(&self, _status: u16, _headers: HeaderMap, value: T) -> T {
        value
    }

    fn mock<T>(&self, value: T) -> T {
        value
    }
}

/// Returns status, headers and the decoded value.
///
/// Mocked calls report status 200 with no headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpResponse;

impl Caller for HttpResponse {
    type Output<T> = Response<T>;

    fn finish<T>(&self, status: u16, headers: HeaderMap, value: T) -> Response<T> {
        Response::new(status, headers, value)
    }

    fn mock<T>(&self, value: T) -> Response<T> {
        Response::new(200, HeaderMap::new(), value)
    }
}

/// Slot holding the status check run between the round trip and decoding.
pub struct StatusValidatorKey;

impl ConfigKey for StatusValidatorKey {
    type Value = StatusValidator;

    fn default_value() -> StatusValidator {
        StatusValidator::success()
    }
}

/// Maps the error of a failed call. It may wrap the error but cannot
/// turn the failure into a success.
pub type ErrorHandler = Arc<dyn Fn(Error, &Configs) -> Error + Send + Sync>;

/// Slot holding the optional [`ErrorHandler`].
pub struct ErrorHandlerKey;

impl ConfigKey for ErrorHandlerKey {
    type Value = Option<ErrorHandler>;

    fn default_value() -> Self::Value {
        None
    }
}
