//! Metrics middleware using the metrics crate facade.
//!
//! This middleware records HTTP request/response metrics using the `metrics` crate,
//! which allows integration with various metrics backends (Prometheus, `StatsD`, etc.).

use std::time::Instant;

use bytes::Bytes;
use skein_core::{BoxFuture, Configs, Request, Response, Result};

use super::{Middleware, Next};

/// Labels used for metrics.
pub(crate) const LABEL_METHOD: &str = "method";
pub(crate) const LABEL_STATUS: &str = "status";

/// Metric names.
pub(crate) const METRIC_REQUESTS_TOTAL: &str = "http_client_requests_total";
pub(crate) const METRIC_REQUEST_DURATION: &str = "http_client_request_duration_seconds";
pub(crate) const METRIC_REQUESTS_IN_FLIGHT: &str = "http_client_requests_in_flight";

/// Status label for a call outcome.
pub(crate) fn status_label(result: &Result<Response<Bytes>>) -> String {
    match result {
        Ok(response) => response.status().to_string(),
        Err(err) => err
            .status_code()
            .map_or_else(|| "error".to_string(), |status| status.to_string()),
    }
}

/// Decrements the in-flight gauge when dropped, cancellation included.
pub(crate) struct InFlight;

impl InFlight {
    pub(crate) fn start() -> Self {
        metrics::gauge!(METRIC_REQUESTS_IN_FLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::gauge!(METRIC_REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

/// Middleware that records HTTP metrics for every pass.
///
/// Records the following metrics:
/// - `http_client_requests_total` (counter): Total number of requests, labeled by method and status
/// - `http_client_request_duration_seconds` (histogram): Request duration in seconds
/// - `http_client_requests_in_flight` (gauge): Number of requests currently in flight
///
/// Registered after a retry it counts calls, registered before it counts attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    _private: (),
}

impl Metrics {
    /// Create a new metrics middleware.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Middleware for Metrics {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        let method = request.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let in_flight = InFlight::start();
            let result = next.run(request, configs).await;
            drop(in_flight);

            let duration = start.elapsed().as_secs_f64();
            metrics::histogram!(METRIC_REQUEST_DURATION, LABEL_METHOD => method.clone())
                .record(duration);

            metrics::counter!(
                METRIC_REQUESTS_TOTAL,
                LABEL_METHOD => method,
                LABEL_STATUS => status_label(&result)
            )
            .increment(1);

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use skein_core::{Error, FnTransport, Method, Transport};

    use super::*;

    fn counting(status: Option<u16>) -> (Arc<AtomicU32>, impl Transport) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let transport = FnTransport::new(move |_request: Request, _configs: Configs| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match status {
                    Some(status) => Ok(Response::from_status(status, "")),
                    None => Err(Error::transport("mock error")),
                }
            }
        });
        (calls, transport)
    }

    fn create_request() -> Request {
        Request::new(Method::Get, "https://example.com/test".parse().expect("url"))
    }

    #[test]
    fn status_labels() {
        assert_eq!(status_label(&Ok(Response::from_status(201, ""))), "201");
        assert_eq!(status_label(&Err(Error::status(404))), "404");
        assert_eq!(status_label(&Err(Error::transport("x"))), "error");
    }

    #[tokio::test]
    async fn metrics_success() {
        let (calls, transport) = counting(Some(200));
        let response = Metrics::new()
            .handle(create_request(), &Configs::new(), Next::new(&[], &transport))
            .await
            .expect("response");

        assert_eq!(response.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn metrics_connection_error() {
        let (calls, transport) = counting(None);
        let result = Metrics::new()
            .handle(create_request(), &Configs::new(), Next::new(&[], &transport))
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
