//! The immutable request builder and call pipeline.
//!
//! A [`Client`] is a pair of step lists. Request steps describe how the
//! request is built, config steps how the call's [`Configs`] are assembled.
//! Both run in registration order, freshly for every call, so a `Client` can
//! be shared, cloned and extended without one call ever affecting another.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use skein_core::{
    Body, BodyDecoder, BodyDecoderKey, BodyEncoder, BodyEncoderKey, ConfigKey, Configs, Decodable,
    Error, HeaderEncoder, HeaderEncoderKey, HeaderMap, Method, QueryEncoder, QueryEncoderKey, Raw,
    RawBytes, Request, Response, Result, Serializer, Text, Transport, Unit, parse_header, to_value,
};
use tokio::time::Instant;
use tracing::{Instrument, debug, field, info, info_span, warn};
use url::Url;

use crate::caller::{Caller, ErrorHandlerKey, Http, HttpResponse, StatusValidatorKey};
use crate::listener::{CallSummary, Listener, Listeners, ListenersKey, RequestId};
use crate::middleware::{
    AuthEnabledKey, BearerAuth, LogLevel, LogLevelKey, Logging, Middleware, MiddlewaresKey,
    RateLimit, RateLimitPolicy, Retry, RetryPolicy, StatusValidator, Throttle, ThrottlePolicy,
    Timeout, TokenRefresher, Validation,
};
use crate::mock::{MockPolicy, MockPolicyKey, MocksKey};
use crate::transport::TransportKey;

// ============================================================================
// Steps
// ============================================================================

/// How a header step writes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// Replace existing values.
    Insert,
    /// Add next to existing values.
    Append,
}

type CustomFn = dyn Fn(&mut Request, &Configs) -> Result<()> + Send + Sync;

/// Arbitrary request mutation registered with [`Client::modify_request`].
#[derive(Clone)]
pub struct CustomStep(Arc<CustomFn>);

impl fmt::Debug for CustomStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomStep(..)")
    }
}

/// One step of request building, applied in registration order.
#[derive(Debug, Clone)]
pub enum RequestStep {
    /// Set an already parsed URL.
    BaseUrl(Url),
    /// Set the URL, resolved against the current one when relative.
    Url(String),
    /// Set the method.
    Method(Method),
    /// Append path segments, split on `/`.
    Path(String),
    /// Write a header.
    Header {
        /// Header name.
        name: String,
        /// Header value.
        value: String,
        /// Insert or append.
        mode: HeaderMode,
    },
    /// Append query pairs.
    Query(Vec<(String, String)>),
    /// Set a raw body.
    Body(Body),
    /// Set a file body, read by the transport.
    BodyFile(PathBuf),
    /// Value encoded into query pairs with the configured query encoder.
    EncodedQuery(Value),
    /// Value encoded into headers with the configured header encoder.
    EncodedHeaders(Value),
    /// Value encoded into the body with the configured body encoder.
    EncodedBody(Value),
    /// Custom mutation.
    Custom(CustomStep),
    /// A step that could not be recorded. Building fails with its error.
    Invalid(Error),
}

type ConfigFn = dyn Fn(Configs) -> Configs + Send + Sync;

#[derive(Clone)]
struct ConfigStep {
    label: &'static str,
    apply: Arc<ConfigFn>,
}

/// Request fields while the steps run.
struct Draft {
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    body: Option<Body>,
}

impl Draft {
    fn url_mut(&mut self) -> Result<&mut Url> {
        self.url
            .as_mut()
            .ok_or_else(|| Error::request_build("no URL set"))
    }

    fn apply(&mut self, step: &RequestStep, configs: &Configs) -> Result<()> {
        match step {
            RequestStep::BaseUrl(url) => self.url = Some(url.clone()),
            RequestStep::Url(raw) => {
                let parsed = match &self.url {
                    Some(current) => current.join(raw),
                    None => Url::parse(raw),
                };
                let url = parsed
                    .map_err(|e| Error::request_build(format!("invalid URL `{raw}`: {e}")))?;
                self.url = Some(url);
            }
            RequestStep::Method(method) => self.method = *method,
            RequestStep::Path(path) => {
                self.url_mut()?
                    .path_segments_mut()
                    .map_err(|()| Error::request_build("URL cannot take a path"))?
                    .pop_if_empty()
                    .extend(path.split('/').filter(|segment| !segment.is_empty()));
            }
            RequestStep::Header { name, value, mode } => {
                self.write_header(name, value, *mode)?;
            }
            RequestStep::Query(pairs) => self.append_query(pairs)?,
            RequestStep::Body(body) => self.body = Some(body.clone()),
            RequestStep::BodyFile(path) => self.body = Some(Body::File(path.clone())),
            RequestStep::EncodedQuery(value) => {
                let pairs = configs.get::<QueryEncoderKey>().encode(value, configs)?;
                self.append_query(&pairs)?;
            }
            RequestStep::EncodedHeaders(value) => {
                let pairs = configs.get::<HeaderEncoderKey>().encode(value, configs)?;
                for (name, value) in &pairs {
                    self.write_header(name, value, HeaderMode::Insert)?;
                }
            }
            RequestStep::EncodedBody(value) => {
                let encoder = configs.get::<BodyEncoderKey>();
                self.body = Some(Body::Bytes(encoder.encode(value, configs)?));
                self.headers
                    .entry(CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static(encoder.content_type().as_str()));
            }
            RequestStep::Custom(CustomStep(custom)) => {
                let url = self
                    .url
                    .take()
                    .ok_or_else(|| Error::request_build("no URL set"))?;
                let mut request = Request::from_parts(
                    self.method,
                    url,
                    std::mem::take(&mut self.headers),
                    self.body.take(),
                );
                let outcome = custom(&mut request, configs);
                let (method, url, headers, body) = request.into_parts();
                *self = Self {
                    method,
                    url: Some(url),
                    headers,
                    body,
                };
                outcome?;
            }
            RequestStep::Invalid(err) => return Err(err.clone()),
        }
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str, mode: HeaderMode) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        match mode {
            HeaderMode::Insert => {
                self.headers.insert(name, value);
            }
            HeaderMode::Append => {
                self.headers.append(name, value);
            }
        }
        Ok(())
    }

    fn append_query(&mut self, pairs: &[(String, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.url_mut()?.query_pairs_mut().extend_pairs(pairs);
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Immutable, declarative HTTP call description.
///
/// Every modifier returns a new `Client`; the receiver is left untouched.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use skein::Client;
///
/// let api = Client::new("https://api.github.com")
///     .header("accept", "application/vnd.github+json")
///     .retry_limit(2)
///     .timeout(Duration::from_secs(5));
///
/// let user: User = api.path("users/octocat").json().await?;
/// ```
#[derive(Clone, Default)]
pub struct Client {
    request_steps: Vec<RequestStep>,
    config_steps: Vec<ConfigStep>,
}

impl Client {
    /// Client targeting `base_url`. An invalid URL fails at build time.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::empty().request_step(RequestStep::Url(base_url.into()))
    }

    /// Client targeting an already parsed URL.
    #[must_use]
    pub fn from_url(url: Url) -> Self {
        Self::empty().request_step(RequestStep::BaseUrl(url))
    }

    /// Client with no steps at all. A URL must be set before calling.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a client with `step` appended.
    #[must_use]
    pub fn request_step(&self, step: RequestStep) -> Self {
        let mut next = self.clone();
        next.request_steps.push(step);
        next
    }

    fn config_step(
        &self,
        label: &'static str,
        apply: impl Fn(Configs) -> Configs + Send + Sync + 'static,
    ) -> Self {
        let mut next = self.clone();
        next.config_steps.push(ConfigStep {
            label,
            apply: Arc::new(apply),
        });
        next
    }

    /// Recorded request steps, in application order.
    #[must_use]
    pub fn request_steps(&self) -> &[RequestStep] {
        &self.request_steps
    }

    /// Labels of the recorded config steps, in application order.
    #[must_use]
    pub fn config_step_labels(&self) -> Vec<&'static str> {
        self.config_steps.iter().map(|step| step.label).collect()
    }

    // ------------------------------------------------------------------------
    // Request modifiers
    // ------------------------------------------------------------------------

    /// Replace the URL. Relative values resolve against the current URL.
    pub fn url(&self, url: impl Into<String>) -> Self {
        self.request_step(RequestStep::Url(url.into()))
    }

    /// Append path segments. `"users/42"` adds two segments, each
    /// percent-encoded.
    pub fn path(&self, path: impl Into<String>) -> Self {
        self.request_step(RequestStep::Path(path.into()))
    }

    /// Set the method.
    #[must_use]
    pub fn method(&self, method: Method) -> Self {
        self.request_step(RequestStep::Method(method))
    }

    /// `GET`.
    #[must_use]
    pub fn get(&self) -> Self {
        self.method(Method::Get)
    }

    /// `POST`.
    #[must_use]
    pub fn post(&self) -> Self {
        self.method(Method::Post)
    }

    /// `PUT`.
    #[must_use]
    pub fn put(&self) -> Self {
        self.method(Method::Put)
    }

    /// `PATCH`.
    #[must_use]
    pub fn patch(&self) -> Self {
        self.method(Method::Patch)
    }

    /// `DELETE`.
    #[must_use]
    pub fn delete(&self) -> Self {
        self.method(Method::Delete)
    }

    /// `HEAD`.
    #[must_use]
    pub fn head(&self) -> Self {
        self.method(Method::Head)
    }

    /// `OPTIONS`.
    #[must_use]
    pub fn options(&self) -> Self {
        self.method(Method::Options)
    }

    /// Set a header, replacing previous values.
    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_step(RequestStep::Header {
            name: name.into(),
            value: value.into(),
            mode: HeaderMode::Insert,
        })
    }

    /// Add a header value, keeping previous ones.
    pub fn append_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_step(RequestStep::Header {
            name: name.into(),
            value: value.into(),
            mode: HeaderMode::Append,
        })
    }

    /// Headers encoded from `value` with the configured header encoder.
    pub fn headers_from<T: Serialize + ?Sized>(&self, value: &T) -> Self {
        let step = to_value(value).map_or_else(RequestStep::Invalid, RequestStep::EncodedHeaders);
        self.request_step(step)
    }

    /// Append one query pair.
    pub fn query(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_step(RequestStep::Query(vec![(name.into(), value.into())]))
    }

    /// Query pairs encoded from `value` with the configured query encoder.
    pub fn query_from<T: Serialize + ?Sized>(&self, value: &T) -> Self {
        let step = to_value(value).map_or_else(RequestStep::Invalid, RequestStep::EncodedQuery);
        self.request_step(step)
    }

    /// Raw body. No content type is added.
    pub fn body(&self, body: impl Into<Body>) -> Self {
        self.request_step(RequestStep::Body(body.into()))
    }

    /// Body encoded from `value` with the configured body encoder, which
    /// also provides the `content-type` unless one is set.
    pub fn body_from<T: Serialize + ?Sized>(&self, value: &T) -> Self {
        let step = to_value(value).map_or_else(RequestStep::Invalid, RequestStep::EncodedBody);
        self.request_step(step)
    }

    /// Body read from a file when the request is sent.
    pub fn body_file(&self, path: impl Into<PathBuf>) -> Self {
        self.request_step(RequestStep::BodyFile(path.into()))
    }

    /// Custom request mutation, run with the call configuration.
    pub fn modify_request(
        &self,
        modify: impl Fn(&mut Request, &Configs) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.request_step(RequestStep::Custom(CustomStep(Arc::new(modify))))
    }

    // ------------------------------------------------------------------------
    // Config modifiers
    // ------------------------------------------------------------------------

    /// Arbitrary config mutation.
    pub fn configs(&self, modify: impl Fn(Configs) -> Configs + Send + Sync + 'static) -> Self {
        self.config_step("configs", modify)
    }

    /// Set a config slot.
    #[must_use]
    pub fn config<K: ConfigKey>(&self, value: K::Value) -> Self {
        self.config_step("config", move |configs| configs.with::<K>(value.clone()))
    }

    /// Body encoder used by [`Client::body_from`].
    pub fn body_encoder(&self, encoder: impl BodyEncoder) -> Self {
        let encoder: Arc<dyn BodyEncoder> = Arc::new(encoder);
        self.config_step("body_encoder", move |configs| {
            configs.with::<BodyEncoderKey>(Arc::clone(&encoder))
        })
    }

    /// Query encoder used by [`Client::query_from`].
    pub fn query_encoder(&self, encoder: impl QueryEncoder) -> Self {
        let encoder: Arc<dyn QueryEncoder> = Arc::new(encoder);
        self.config_step("query_encoder", move |configs| {
            configs.with::<QueryEncoderKey>(Arc::clone(&encoder))
        })
    }

    /// Header encoder used by [`Client::headers_from`].
    pub fn header_encoder(&self, encoder: impl HeaderEncoder) -> Self {
        let encoder: Arc<dyn HeaderEncoder> = Arc::new(encoder);
        self.config_step("header_encoder", move |configs| {
            configs.with::<HeaderEncoderKey>(Arc::clone(&encoder))
        })
    }

    /// Body decoder used by [`Decodable`] serializers.
    pub fn decoder(&self, decoder: impl BodyDecoder) -> Self {
        let decoder: Arc<dyn BodyDecoder> = Arc::new(decoder);
        self.config_step("decoder", move |configs| {
            configs.with::<BodyDecoderKey>(Arc::clone(&decoder))
        })
    }

    /// Register `middleware` as the new outermost layer.
    ///
    /// The instance is shared by every call made through this client and
    /// its descendants.
    pub fn middleware(&self, middleware: impl Middleware) -> Self {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.config_step("middleware", move |configs| {
            configs.update::<MiddlewaresKey>(|chain| chain.register_arc(Arc::clone(&middleware)))
        })
    }

    /// Transport at the end of the chain.
    pub fn transport(&self, transport: impl Transport) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        self.config_step("transport", move |configs| {
            configs.with::<TransportKey>(Arc::clone(&transport))
        })
    }

    /// Status check run after the whole chain, before decoding.
    #[must_use]
    pub fn validate_status(&self, validator: StatusValidator) -> Self {
        self.config_step("validate_status", move |configs| {
            configs.with::<StatusValidatorKey>(validator.clone())
        })
    }

    /// Status check at this position in the chain.
    #[must_use]
    pub fn validate(&self, validator: StatusValidator) -> Self {
        self.middleware(Validation::new(validator))
    }

    /// Retry with `policy`.
    #[must_use]
    pub fn retry(&self, policy: RetryPolicy) -> Self {
        self.middleware(Retry::new(policy))
    }

    /// Retry up to `limit` times with the default backoff and condition.
    #[must_use]
    pub fn retry_limit(&self, limit: u32) -> Self {
        self.retry(RetryPolicy::new(Some(limit)))
    }

    /// Fail with [`Error::Timeout`] when the inner layers take longer than
    /// `duration`.
    #[must_use]
    pub fn timeout(&self, duration: Duration) -> Self {
        self.middleware(Timeout::new(duration))
    }

    /// Deduplicate identical requests with `policy`.
    #[must_use]
    pub fn throttle(&self, policy: ThrottlePolicy) -> Self {
        self.middleware(Throttle::new(policy))
    }

    /// Back off on rate-limited responses with `policy`.
    #[must_use]
    pub fn rate_limit(&self, policy: RateLimitPolicy) -> Self {
        self.middleware(RateLimit::new(policy))
    }

    /// Manage access tokens with `refresher`.
    #[must_use]
    pub fn token_refresher(&self, refresher: TokenRefresher) -> Self {
        self.middleware(refresher)
    }

    /// Static bearer token.
    pub fn bearer_auth(&self, token: impl Into<String>) -> Self {
        self.middleware(BearerAuth::new(token))
    }

    /// Static basic credentials.
    #[cfg(feature = "basic-auth")]
    pub fn basic_auth(&self, username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        self.middleware(crate::middleware::BasicAuth::new(username, password))
    }

    /// Switch authentication middlewares on or off.
    #[must_use]
    pub fn auth_enabled(&self, enabled: bool) -> Self {
        self.config::<AuthEnabledKey>(enabled)
    }

    /// Register `value` as the mock for its type.
    pub fn mock<T: Clone + Send + Sync + 'static>(&self, value: T) -> Self {
        self.config_step("mock", move |configs| {
            configs.update::<MocksKey>(|mocks| mocks.with(value.clone()))
        })
    }

    /// When mocks are used.
    #[must_use]
    pub fn mock_policy(&self, policy: MockPolicy) -> Self {
        self.config::<MockPolicyKey>(policy)
    }

    /// Observe call lifecycle events.
    pub fn listener(&self, listener: impl Listener) -> Self {
        let listener: Arc<dyn Listener> = Arc::new(listener);
        self.config_step("listener", move |configs| {
            configs.update::<ListenersKey>(|listeners| listeners.register(Arc::clone(&listener)))
        })
    }

    /// Level of the per-call log events.
    #[must_use]
    pub fn log_level(&self, level: LogLevel) -> Self {
        self.config::<LogLevelKey>(level)
    }

    /// Log every pass through this position in the chain.
    #[must_use]
    pub fn logging(&self, level: LogLevel) -> Self {
        self.middleware(Logging::with_level(level))
    }

    /// Record request metrics at this position in the chain.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn metrics(&self) -> Self {
        self.middleware(crate::middleware::Metrics::new())
    }

    /// Map the error of failed calls.
    pub fn error_handler(
        &self,
        handler: impl Fn(Error, &Configs) -> Error + Send + Sync + 'static,
    ) -> Self {
        self.config::<ErrorHandlerKey>(Some(Arc::new(handler)))
    }

    // ------------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------------

    /// Materialize the call configuration: defaults, then every config step
    /// in registration order.
    #[must_use]
    pub fn resolve_configs(&self) -> Configs {
        self.config_steps
            .iter()
            .fold(Configs::new(), |configs, step| (step.apply)(configs))
    }

    /// Build the request with `configs`, stopping at the first failing step.
    pub fn build_with(&self, configs: &Configs) -> Result<Request> {
        let mut draft = Draft {
            method: Method::Get,
            url: None,
            headers: HeaderMap::new(),
            body: None,
        };
        for step in &self.request_steps {
            draft.apply(step, configs)?;
        }
        let url = draft
            .url
            .ok_or_else(|| Error::request_build("no URL set"))?;
        Ok(Request::from_parts(draft.method, url, draft.headers, draft.body))
    }

    /// Build the request with freshly resolved configs.
    pub fn build(&self) -> Result<Request> {
        self.build_with(&self.resolve_configs())
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Execute the call, decoding with `serializer` and shaping with `caller`.
    pub async fn call<C, S>(&self, caller: &C, serializer: &S) -> Result<C::Output<S::Value>>
    where
        C: Caller,
        S: Serializer,
    {
        let configs = self.resolve_configs();
        let id = RequestId::next();
        let level = configs.get::<LogLevelKey>();
        let span = info_span!("http_call", id = %id, method = field::Empty, url = field::Empty);

        let mut completion = Completion {
            id,
            listeners: configs.get::<ListenersKey>(),
            start: Instant::now(),
            summary: CallSummary {
                method: None,
                status: None,
                failed: true,
                mocked: false,
                elapsed: Duration::ZERO,
            },
        };

        let outcome = self
            .run(caller, serializer, &configs, &mut completion, level)
            .instrument(span.clone())
            .await;

        match outcome {
            Ok(output) => {
                completion.summary.failed = false;
                Ok(output)
            }
            Err(err) => {
                let err = match configs.get::<ErrorHandlerKey>() {
                    Some(handler) => handler(err, &configs),
                    None => err,
                };
                if completion.summary.status.is_none() {
                    completion.summary.status = err.status_code();
                }
                if level != LogLevel::Off {
                    let elapsed_ms = elapsed_millis(completion.start);
                    span.in_scope(|| warn!(error = %err, elapsed_ms, "request failed"));
                }
                completion
                    .listeners
                    .notify(|listener| listener.error(id, &err));
                Err(err)
            }
        }
    }

    async fn run<C, S>(
        &self,
        caller: &C,
        serializer: &S,
        configs: &Configs,
        completion: &mut Completion,
        level: LogLevel,
    ) -> Result<C::Output<S::Value>>
    where
        C: Caller,
        S: Serializer,
    {
        let id = completion.id;
        let request = self.build_with(configs)?;
        completion.summary.method = Some(request.method());
        let span = tracing::Span::current();
        span.record("method", field::display(request.method()));
        span.record("url", field::display(request.url()));

        match configs.get::<MockPolicyKey>() {
            MockPolicy::Ignore => {}
            MockPolicy::IfSpecified => {
                if let Some(value) = configs.get::<MocksKey>().get::<S::Value>() {
                    debug!("serving registered mock");
                    completion.summary.mocked = true;
                    return Ok(caller.mock(value));
                }
            }
            MockPolicy::Require => {
                let value = configs.get::<MocksKey>().get::<S::Value>().ok_or(
                    Error::MockMissing {
                        type_name: std::any::type_name::<S::Value>(),
                    },
                )?;
                debug!("serving registered mock");
                completion.summary.mocked = true;
                return Ok(caller.mock(value));
            }
        }

        completion
            .listeners
            .notify(|listener| listener.request_started(id, &request));
        match level {
            LogLevel::Off => {}
            LogLevel::Debug => debug!(headers = ?request.headers(), "sending request"),
            LogLevel::Info => info!("sending request"),
        }

        let response = caller.round_trip(request, configs).await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                completion.summary.status = err.status_code();
                return Err(err);
            }
        };
        completion.summary.status = Some(response.status());
        completion
            .listeners
            .notify(|listener| listener.response_received(id, &response));

        configs.get::<StatusValidatorKey>().validate(&response)?;
        let value = serializer.serialize(&response, configs)?;
        completion.listeners.notify(|listener| {
            listener.response_serialized(id, std::any::type_name::<S::Value>());
        });

        let status = response.status();
        let elapsed_ms = elapsed_millis(completion.start);
        match level {
            LogLevel::Off => {}
            LogLevel::Debug => {
                debug!(status, elapsed_ms, headers = ?response.headers(), "request completed");
            }
            LogLevel::Info => info!(status, elapsed_ms, "request completed"),
        }

        let (status, headers, _) = response.into_parts();
        Ok(caller.finish(status, headers, value))
    }

    /// The whole response, validated.
    pub async fn send(&self) -> Result<Response<Bytes>> {
        self.call(&Http, &Raw).await
    }

    /// Body decoded into `T`.
    pub async fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.call(&Http, &Decodable::<T>::new()).await
    }

    /// Status, headers and the body decoded into `T`.
    pub async fn json_response<T>(&self) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.call(&HttpResponse, &Decodable::<T>::new()).await
    }

    /// Body as UTF-8 text.
    pub async fn text(&self) -> Result<String> {
        self.call(&Http, &Text).await
    }

    /// Body bytes.
    pub async fn bytes(&self) -> Result<Bytes> {
        self.call(&Http, &RawBytes).await
    }

    /// Discard the body.
    pub async fn unit(&self) -> Result<()> {
        self.call(&Http, &Unit).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("request_steps", &self.request_steps)
            .field("config_steps", &self.config_step_labels())
            .finish()
    }
}

fn elapsed_millis(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Notifies `request_completed` when the call ends, cancellation included.
struct Completion {
    id: RequestId,
    listeners: Listeners,
    start: Instant,
    summary: CallSummary,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.summary.elapsed = self.start.elapsed();
        let (id, summary) = (self.id, &self.summary);
        self.listeners
            .notify(|listener| listener.request_completed(id, summary));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::{check, let_assert};
    use serde_json::json;
    use skein_core::{ArrayEncoding, FormEncoder, UrlQueryEncoder};

    use super::*;

    fn api() -> Client {
        Client::new("https://api.example.com/v1/")
    }

    #[test]
    fn steps_apply_in_registration_order() {
        let request = api()
            .path("users/42")
            .post()
            .header("x-a", "1")
            .header("x-a", "2")
            .append_header("x-b", "1")
            .append_header("x-b", "2")
            .query("page", "2")
            .build()
            .expect("request");

        check!(request.method() == Method::Post);
        check!(request.url().as_str() == "https://api.example.com/v1/users/42?page=2");
        check!(request.header("x-a") == Some("2"));
        check!(request.headers().get_all("x-b").iter().count() == 2);
        check!(request.body().is_none());
    }

    #[test]
    fn path_segments_are_encoded() {
        let request = api().path("search/a b").build().expect("request");
        check!(request.url().path() == "/v1/search/a%20b");
    }

    #[test]
    fn url_resolves_relative_to_current() {
        let request = api().url("../v2/items").build().expect("request");
        check!(request.url().as_str() == "https://api.example.com/v2/items");

        let absolute = api().url("http://other.test/x").build().expect("request");
        check!(absolute.host() == "other.test");
    }

    #[test]
    fn building_stops_at_first_failure() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let result = api()
            .header("bad header", "x")
            .modify_request(move |_request, _configs| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build();

        let_assert!(Err(err) = result);
        check!(err.is_request_build());
        check!(runs.load(Ordering::SeqCst) == 0);
    }

    #[test]
    fn missing_or_invalid_url_fails() {
        let_assert!(Err(err) = Client::empty().get().build());
        check!(err.is_request_build());

        let_assert!(Err(err) = Client::new("not a url").build());
        check!(err.is_request_build());

        let_assert!(Err(err) = Client::empty().path("x").build());
        check!(err.is_request_build());
    }

    #[test]
    fn modifiers_never_mutate_the_receiver() {
        let base = api().header("x-base", "1");
        let derived = base.header("x-derived", "1").timeout(Duration::from_secs(1));

        check!(base.request_steps().len() == 2);
        check!(base.config_step_labels().is_empty());
        check!(derived.request_steps().len() == 3);
        check!(derived.config_step_labels() == ["middleware"]);
        check!(base.build().expect("base").header("x-derived").is_none());
    }

    #[test]
    fn encoded_steps_use_configured_encoders() {
        #[derive(Serialize)]
        struct Filter {
            tags: Vec<&'static str>,
            limit: u32,
        }

        let filter = Filter {
            tags: vec!["a", "b"],
            limit: 5,
        };
        let request = api()
            .query_encoder(UrlQueryEncoder::new(ArrayEncoding::CommaSeparated))
            .query_from(&filter)
            .body_encoder(FormEncoder)
            .body_from(&json!({"name": "skein"}))
            .headers_from(&json!({"x-tags": ["a", "b"]}))
            .build()
            .expect("request");

        check!(request.url().query() == Some("limit=5&tags=a%2Cb"));
        check!(request.header("content-type") == Some("application/x-www-form-urlencoded"));
        check!(request.header("x-tags") == Some("a,b"));
        let_assert!(Some(Body::Bytes(body)) = request.body());
        check!(body.as_ref() == b"name=skein");
    }

    #[test]
    fn explicit_content_type_wins() {
        let request = api()
            .header("content-type", "application/merge-patch+json")
            .body_from(&json!({"a": 1}))
            .build()
            .expect("request");
        check!(request.header("content-type") == Some("application/merge-patch+json"));
    }

    #[test]
    fn unencodable_value_fails_at_build() {
        let_assert!(Err(err) = api().query_from(&json!(["not", "an", "object"])).build());
        check!(err.is_request_build());
    }

    #[test]
    fn file_body_is_a_reference() {
        let request = api().body_file("/tmp/upload.bin").build().expect("request");
        check!(request.body() == Some(&Body::File(PathBuf::from("/tmp/upload.bin"))));
    }

    #[test]
    fn custom_step_sees_configs() {
        let request = api()
            .auth_enabled(false)
            .modify_request(|request, configs| {
                let enabled = configs.get::<AuthEnabledKey>().to_string();
                let (name, value) = parse_header("x-auth-enabled", &enabled)?;
                request.headers_mut().insert(name, value);
                Ok(())
            })
            .build()
            .expect("request");
        check!(request.header("x-auth-enabled") == Some("false"));
    }

    #[test]
    fn configs_are_resolved_fresh() {
        let client = api().log_level(LogLevel::Debug).retry_limit(1).retry_limit(2);
        let first = client.resolve_configs();
        let second = client.resolve_configs();

        check!(first.get::<LogLevelKey>() == LogLevel::Debug);
        check!(first.get::<MiddlewaresKey>().len() == 2);
        check!(second.get::<MiddlewaresKey>().len() == 2);
        check!(Client::empty().resolve_configs().is_empty());
    }

    #[test]
    fn step_labels() {
        let client = api()
            .transport(skein_core::FnTransport::new(|_request: Request, _configs: Configs| async {
                Ok::<_, Error>(Response::from_status(200, ""))
            }))
            .mock(1_u8)
            .mock_policy(MockPolicy::Require)
            .retry_limit(1);
        insta::assert_snapshot!(
            client.config_step_labels().join(", "),
            @"transport, mock, config, middleware"
        );
    }
}
