//! Call lifecycle observers.
//!
//! Listeners are notified at fixed points of every call: after the request
//! is built, when the raw response arrives, after decoding, on failure and on
//! completion. A panicking listener is logged and skipped; listeners never
//! change the outcome of a call.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use skein_core::{ConfigKey, Error, Method, Request, Response};
use tracing::warn;

/// Process-unique identifier of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a finished call looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    /// Request method, `None` if the request could not be built.
    pub method: Option<Method>,
    /// Last HTTP status seen, from a response or a status error.
    pub status: Option<u16>,
    /// `true` if the call failed.
    pub failed: bool,
    /// Whether the result came from a registered mock.
    pub mocked: bool,
    /// Total call duration.
    pub elapsed: Duration,
}

/// Observer of call lifecycle events. Every method defaults to a no-op.
///
/// Panics are contained only when the binary unwinds; with `panic = "abort"`
/// a panicking listener ends the process.
#[allow(unused_variables)]
pub trait Listener: Send + Sync + 'static {
    /// The request was built and is about to enter the middleware chain.
    fn request_started(&self, id: RequestId, request: &Request) {}

    /// The chain returned a response, before status validation.
    fn response_received(&self, id: RequestId, response: &Response<Bytes>) {}

    /// The response was decoded into `type_name`.
    fn response_serialized(&self, id: RequestId, type_name: &'static str) {}

    /// The call failed. Called at most once per call.
    fn error(&self, id: RequestId, error: &Error) {}

    /// The call finished, successfully or not. Always called once.
    fn request_completed(&self, id: RequestId, summary: &CallSummary) {}

    /// Name shown in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Ordered set of listeners.
#[derive(Clone, Default)]
pub struct Listeners {
    listeners: Vec<Arc<dyn Listener>>,
}

impl Listeners {
    /// No listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new set with `listener` appended.
    #[must_use]
    pub fn register(&self, listener: Arc<dyn Listener>) -> Self {
        let mut listeners = self.listeners.clone();
        listeners.push(listener);
        Self { listeners }
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if there are none.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Invoke `event` on every listener, containing panics.
    pub(crate) fn notify(&self, event: impl Fn(&dyn Listener)) {
        for listener in &self.listeners {
            let listener = listener.as_ref();
            if catch_unwind(AssertUnwindSafe(|| event(listener))).is_err() {
                warn!(listener = listener.name(), "listener panicked, ignoring");
            }
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.listeners.iter().map(|listener| listener.name()))
            .finish()
    }
}

/// Slot holding the listeners of a call.
pub struct ListenersKey;

impl ConfigKey for ListenersKey {
    type Value = Listeners;

    fn default_value() -> Listeners {
        Listeners::new()
    }
}

#[cfg(feature = "metrics")]
pub use self::metrics_listener::MetricsListener;

#[cfg(feature = "metrics")]
mod metrics_listener {
    use std::collections::HashSet;
    use std::sync::{Mutex, PoisonError};

    use skein_core::Request;

    use super::{CallSummary, Listener, RequestId};
    use crate::middleware::metrics::{
        LABEL_METHOD, LABEL_STATUS, METRIC_REQUEST_DURATION, METRIC_REQUESTS_IN_FLIGHT,
        METRIC_REQUESTS_TOTAL,
    };

    /// Records one sample per call through the `metrics` facade.
    ///
    /// - `http_client_requests_total` (counter), by method and status
    /// - `http_client_request_duration_seconds` (histogram), by method
    /// - `http_client_requests_in_flight` (gauge)
    ///
    /// Mocked calls are not recorded.
    #[derive(Debug, Default)]
    pub struct MetricsListener {
        in_flight: Mutex<HashSet<RequestId>>,
    }

    impl MetricsListener {
        /// Create the listener.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Listener for MetricsListener {
        fn request_started(&self, id: RequestId, _request: &Request) {
            self.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id);
            metrics::gauge!(METRIC_REQUESTS_IN_FLIGHT).increment(1.0);
        }

        fn request_completed(&self, id: RequestId, summary: &CallSummary) {
            let started = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            if started {
                metrics::gauge!(METRIC_REQUESTS_IN_FLIGHT).decrement(1.0);
            }
            if summary.mocked {
                return;
            }

            let method = summary
                .method
                .map_or_else(|| "unknown".to_string(), |method| method.to_string());
            let status = summary
                .status
                .map_or_else(|| "error".to_string(), |status| status.to_string());

            metrics::histogram!(METRIC_REQUEST_DURATION, LABEL_METHOD => method.clone())
                .record(summary.elapsed.as_secs_f64());
            metrics::counter!(
                METRIC_REQUESTS_TOTAL,
                LABEL_METHOD => method,
                LABEL_STATUS => status
            )
            .increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use skein_core::Method;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Listener for Recorder {
        fn request_started(&self, id: RequestId, request: &Request) {
            self.events
                .lock()
                .expect("lock")
                .push(format!("{id} started {}", request.method()));
        }

        fn error(&self, id: RequestId, error: &Error) {
            self.events
                .lock()
                .expect("lock")
                .push(format!("{id} error {error}"));
        }
    }

    struct Panicking;

    impl Listener for Panicking {
        fn request_started(&self, _id: RequestId, _request: &Request) {
            panic!("listener bug");
        }
    }

    #[test]
    fn ids_are_unique() {
        let first = RequestId::next();
        let second = RequestId::next();
        assert!(second > first);
        assert_eq!(first.to_string(), first.get().to_string());
    }

    #[test]
    fn panicking_listener_does_not_stop_the_others() {
        let recorder = Arc::new(Recorder::default());
        let listeners = Listeners::new()
            .register(Arc::new(Panicking))
            .register(Arc::clone(&recorder) as Arc<dyn Listener>);
        let request = Request::new(Method::Delete, "https://example.com/".parse().expect("url"));
        let id = RequestId::next();

        listeners.notify(|listener| listener.request_started(id, &request));
        listeners.notify(|listener| listener.error(id, &Error::Cancelled));

        let events = recorder.events.lock().expect("lock").clone();
        assert_eq!(
            events,
            [format!("{id} started DELETE"), format!("{id} error request cancelled")]
        );
    }

    #[test]
    fn register_is_copy_on_write() {
        let base = Listeners::new();
        let extended = base.register(Arc::new(Panicking));
        assert!(base.is_empty());
        assert_eq!(extended.len(), 1);
        assert!(format!("{extended:?}").contains("Panicking"));
    }
}
