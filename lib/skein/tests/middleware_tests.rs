//! Engine behavior through closure transports: middleware order, retry,
//! cancellation, token refresh, throttling, rate limiting, mocks, listeners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures_util::future::join_all;
use skein::middleware::{
    Backoff, Middleware, Next, RateLimitPolicy, RetryCondition, RetryPolicy, StatusValidator,
    ThrottlePolicy, TokenRefresher, Tokens,
};
use skein::{
    BoxFuture, CallSummary, Client, Configs, Error, FnTransport, Http, HttpResponse,
    InMemorySecureCache, Listener, MockPolicy, Request, RequestId, Response, Result,
    SecureCacheKey, Text, Transport, Unit,
};
use tokio::time::Instant;

/// Transport answering `respond(call_index)` and counting calls.
fn scripted(
    respond: impl Fn(usize) -> Result<Response<Bytes>> + Send + Sync + 'static,
) -> (Arc<AtomicUsize>, impl Transport) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = FnTransport::new(move |_request: Request, _configs: Configs| {
        std::future::ready(respond(counter.fetch_add(1, Ordering::SeqCst)))
    });
    (calls, transport)
}

fn api() -> Client {
    Client::new("https://api.example.com")
}

// ============================================================================
// Chain order
// ============================================================================

struct Marker {
    label: &'static str,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Marker {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        Box::pin(async move {
            self.trace.lock().expect("lock").push(format!("{} in", self.label));
            let outcome = next.run(request, configs).await;
            self.trace.lock().expect("lock").push(format!("{} out", self.label));
            outcome
        })
    }
}

#[tokio::test]
async fn test_last_registered_middleware_is_outermost() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let marker = |label| Marker {
        label,
        trace: Arc::clone(&trace),
    };
    let (_, transport) = scripted(|_| Ok(Response::from_status(200, "")));

    api()
        .transport(transport)
        .middleware(marker("A"))
        .middleware(marker("B"))
        .middleware(marker("C"))
        .unit()
        .await
        .expect("ok");

    let trace = trace.lock().expect("lock").clone();
    assert_eq!(trace, ["C in", "B in", "A in", "A out", "B out", "C out"]);
}

#[tokio::test(start_paused = true)]
async fn test_validation_position_decides_what_retry_sees() {
    let only_errors = RetryPolicy::new(Some(2))
        .backoff(Backoff::Fixed(Duration::ZERO))
        .condition(RetryCondition::new(|_, outcome| outcome.is_err()));

    // Retry outside the validator sees its errors.
    let (calls, transport) = scripted(|_| Ok(Response::from_status(503, "")));
    let result = api()
        .transport(transport)
        .validate(StatusValidator::success())
        .retry(only_errors.clone())
        .unit()
        .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Retry inside the validator only sees the 503 response.
    let (calls, transport) = scripted(|_| Ok(Response::from_status(503, "")));
    let result = api()
        .transport(transport)
        .retry(only_errors)
        .validate(StatusValidator::success())
        .unit()
        .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Retry, timeout, cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_limit_runs_n_plus_one_attempts() {
    let (calls, transport) = scripted(|_| Ok(Response::from_status(200, "")));

    api()
        .transport(transport)
        .retry(
            RetryPolicy::new(Some(4))
                .condition(RetryCondition::always())
                .backoff(Backoff::Fixed(Duration::from_millis(10))),
        )
        .unit()
        .await
        .expect("ok");

    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_timeout_end_to_end() {
    let (calls, transport) = scripted(|call| {
        if call < 2 {
            Err(Error::transport("connection reset"))
        } else {
            Ok(Response::from_status(200, "done"))
        }
    });
    let timeout = Duration::from_secs(5);
    let start = Instant::now();

    let text = api()
        .transport(transport)
        .retry_limit(2)
        .timeout(timeout)
        .text()
        .await
        .expect("third attempt succeeds");

    assert_eq!(text, "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() <= timeout);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_call_never_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = FnTransport::new(move |_request: Request, _configs: Configs| {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err::<Response<Bytes>, _>(Error::transport("unreachable"))
        }
    });
    let client = api().transport(transport).retry(
        RetryPolicy::new(None)
            .condition(RetryCondition::always())
            .backoff(Backoff::Fixed(Duration::ZERO)),
    );

    let handle = tokio::spawn(async move { client.unit().await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.abort();
    assert!(handle.await.is_err_and(|err| err.is_cancelled()));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_error_is_not_retried() {
    let (calls, transport) = scripted(|_| Err(Error::Cancelled));

    let err = api()
        .transport(transport)
        .retry(RetryPolicy::new(Some(5)).condition(RetryCondition::always()))
        .unit()
        .await
        .expect_err("cancelled");

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Token refresh
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_expired_calls_refresh_once() {
    let cache = InMemorySecureCache::new();
    cache.insert(SecureCacheKey::AccessToken, "stale");
    cache.insert(SecureCacheKey::RefreshToken, "r-1");
    cache.insert(SecureCacheKey::ExpiryDate, "0");

    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&refreshes);
    let refresher = TokenRefresher::builder(cache.clone(), move |refresh_token, _configs| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            assert_eq!(refresh_token.as_deref(), Some("r-1"));
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(Tokens::new("fresh")
                .with_refresh_token("r-2")
                .expires_at(SystemTime::now() + Duration::from_secs(3600)))
        }
    })
    .build();

    let transport = FnTransport::new(|request: Request, _configs: Configs| {
        let status = if request.header("authorization") == Some("Bearer fresh") {
            200
        } else {
            401
        };
        async move { Ok::<_, Error>(Response::from_status(status, "")) }
    });
    let client = api().transport(transport).token_refresher(refresher);

    let results = join_all((0..50).map(|_| client.unit())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&SecureCacheKey::AccessToken).as_deref(), Some("fresh"));
    assert_eq!(cache.get(&SecureCacheKey::RefreshToken).as_deref(), Some("r-2"));
}

#[tokio::test]
async fn test_missing_token_fails_without_request() {
    let (calls, transport) = scripted(|_| Ok(Response::from_status(200, "")));
    let refresher = TokenRefresher::builder(InMemorySecureCache::new(), |_, _| async {
        Ok(Tokens::new("unused"))
    })
    .build();

    let err = api()
        .transport(transport)
        .token_refresher(refresher)
        .unit()
        .await
        .expect_err("no token");

    assert!(matches!(err, Error::TokenNotFound));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Throttle and rate limit
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_throttle_ttl() {
    let (calls, transport) = scripted(|call| Ok(Response::from_status(200, format!("v{call}"))));
    let client = api()
        .path("settings")
        .transport(transport)
        .throttle(ThrottlePolicy::new(Duration::from_secs(10)));

    let first = client.text().await.expect("first");
    tokio::time::sleep(Duration::from_secs(3)).await;
    let second = client.text().await.expect("second");
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let third = client.text().await.expect("third");
    assert_eq!(third, "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backs_off_and_recovers() {
    let (calls, transport) = scripted(|call| {
        let status = if call < 2 { 429 } else { 200 };
        Ok(Response::from_status(status, ""))
    });
    let start = Instant::now();

    api()
        .transport(transport)
        .rate_limit(RateLimitPolicy::new().interval(Duration::from_secs(2)))
        .unit()
        .await
        .expect("recovered");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
}

// ============================================================================
// Mocks
// ============================================================================

#[tokio::test]
async fn test_mock_short_circuits_the_chain() {
    let (calls, transport) = scripted(|_| Ok(Response::from_status(200, "network")));
    let client = api().transport(transport).mock("mocked".to_string());

    let text = client.text().await.expect("mock");
    assert_eq!(text, "mocked");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = client
        .call(&HttpResponse, &Text)
        .await
        .expect("mock");
    assert_eq!(response.status(), 200);
    assert!(response.headers().is_empty());
}

#[tokio::test]
async fn test_mock_policies() {
    let (calls, transport) = scripted(|_| Ok(Response::from_status(200, "network")));
    let client = api().transport(transport);

    let ignored = client
        .mock("mocked".to_string())
        .mock_policy(MockPolicy::Ignore)
        .text()
        .await
        .expect("network");
    assert_eq!(ignored, "network");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = client
        .mock_policy(MockPolicy::Require)
        .text()
        .await
        .expect_err("no mock");
    assert!(matches!(err, Error::MockMissing { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A mock of another type does not satisfy the call.
    let err = client
        .mock(42_u32)
        .mock_policy(MockPolicy::Require)
        .call(&Http, &Unit)
        .await
        .expect_err("no unit mock");
    assert!(matches!(err, Error::MockMissing { .. }));
}

// ============================================================================
// Error handler and listeners
// ============================================================================

#[tokio::test]
async fn test_error_handler_wraps_errors() {
    let (_, transport) = scripted(|_| Ok(Response::from_status(404, "")));

    let err = api()
        .transport(transport)
        .error_handler(|err, _configs| err.context("loading settings"))
        .unit()
        .await
        .expect_err("404");

    assert!(matches!(err, Error::Context { .. }));
    assert_eq!(err.status_code(), Some(404));
    assert!(err.to_string().starts_with("loading settings"));
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().expect("lock").push(event.into());
    }
}

impl Listener for Recorder {
    fn request_started(&self, _id: RequestId, request: &Request) {
        self.push(format!("started {}", request.url().path()));
    }

    fn response_received(&self, _id: RequestId, response: &Response<Bytes>) {
        self.push(format!("received {}", response.status()));
    }

    fn response_serialized(&self, _id: RequestId, type_name: &'static str) {
        self.push(format!("serialized {type_name}"));
    }

    fn error(&self, _id: RequestId, error: &Error) {
        self.push(format!("error {error}"));
    }

    fn request_completed(&self, _id: RequestId, summary: &CallSummary) {
        self.push(format!(
            "completed failed={} status={:?}",
            summary.failed, summary.status
        ));
    }
}

struct Panicking;

impl Listener for Panicking {
    fn response_received(&self, _id: RequestId, _response: &Response<Bytes>) {
        panic!("listener bug");
    }
}

#[tokio::test]
async fn test_listener_lifecycle() {
    let recorder = Recorder::default();
    let (_, transport) = scripted(|call| {
        let status = if call == 0 { 200 } else { 500 };
        Ok(Response::from_status(status, ""))
    });
    let client = api()
        .path("ping")
        .transport(transport)
        .listener(Panicking)
        .listener(recorder.clone());

    client.unit().await.expect("first call succeeds");
    client.unit().await.expect_err("second call fails");

    let events = recorder.events.lock().expect("lock").clone();
    assert_eq!(
        events,
        [
            "started /ping",
            "received 200",
            "serialized ()",
            "completed failed=false status=Some(200)",
            "started /ping",
            "received 500",
            "error response status 500 rejected",
            "completed failed=true status=Some(500)",
        ]
    );
}

#[tokio::test]
async fn test_build_failure_is_reported_once() {
    let recorder = Recorder::default();
    let (calls, transport) = scripted(|_| Ok(Response::from_status(200, "")));

    let err = api()
        .header("bad header", "x")
        .transport(transport)
        .listener(recorder.clone())
        .unit()
        .await
        .expect_err("invalid header");

    assert!(err.is_request_build());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let events = recorder.events.lock().expect("lock").clone();
    assert_eq!(events.len(), 2);
    assert!(events.first().is_some_and(|event| event.starts_with("error ")));
    assert_eq!(
        events.last().map(String::as_str),
        Some("completed failed=true status=None")
    );
}

// ============================================================================
// Immutability
// ============================================================================

#[tokio::test]
async fn test_derived_clients_leave_the_base_untouched() {
    let transport = FnTransport::new(|request: Request, _configs: Configs| {
        let seen = request.header("x-tenant").unwrap_or("none").to_string();
        async move { Ok::<_, Error>(Response::from_status(200, seen)) }
    });
    let base = api().transport(transport);
    let tenant = base.header("x-tenant", "acme");

    assert_eq!(tenant.text().await.expect("tenant"), "acme");
    assert_eq!(base.text().await.expect("base"), "none");
    assert_eq!(tenant.config_step_labels(), base.config_step_labels());
}
