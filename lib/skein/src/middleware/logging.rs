//! Request/response logging middleware.
//!
//! This middleware logs each pass through its position in the chain using
//! the `tracing` crate. The call pipeline logs once per call on its own,
//! driven by [`LogLevelKey`].

use std::time::Instant;

use bytes::Bytes;
use skein_core::{BoxFuture, ConfigKey, Configs, Request, Response, Result};
use tracing::{Instrument, Level, debug, info, span, warn};

use super::{Middleware, Next};

/// Log level for call and middleware logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Nothing is logged.
    Off,
    /// Log at debug level (request/response details).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

/// Slot holding the call-level log level.
pub struct LogLevelKey;

impl ConfigKey for LogLevelKey {
    type Value = LogLevel;

    fn default_value() -> LogLevel {
        LogLevel::Info
    }
}

/// Middleware that logs requests and responses.
///
/// # Example
///
/// ```ignore
/// use skein::{Client, middleware::LogLevel};
///
/// let client = Client::new(base).logging(LogLevel::Debug).retry_limit(3);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging {
    level: LogLevel,
}

impl Logging {
    /// Create a logging middleware with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging middleware with the given level.
    #[must_use]
    pub const fn with_level(level: LogLevel) -> Self {
        Self { level }
    }

    /// Create a logging middleware that logs at debug level.
    #[must_use]
    pub const fn debug() -> Self {
        Self::with_level(LogLevel::Debug)
    }
}

impl Middleware for Logging {
    fn handle<'a>(
        &'a self,
        request: Request,
        configs: &'a Configs,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        let level = self.level;
        if level == LogLevel::Off {
            return next.run(request, configs);
        }

        let method = request.method();
        let url = request.url().to_string();
        let span = span!(Level::INFO, "http_request", %method, %url);

        Box::pin(
            async move {
                let start = Instant::now();

                if level == LogLevel::Debug {
                    debug!(
                        method = %method,
                        url = %url,
                        headers = ?request.headers(),
                        "sending request"
                    );
                } else {
                    info!(method = %method, url = %url, "sending request");
                }

                let result = next.run(request, configs).await;

                // Saturating conversion to u64 (truncates after ~584 million years)
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        if response.is_success() {
                            info!(status, elapsed_ms, "request completed");
                        } else {
                            warn!(status, elapsed_ms, "request failed with HTTP error");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use skein_core::{Error, FnTransport, Method};

    use super::*;

    #[test]
    fn logging_default() {
        assert_eq!(Logging::new().level, LogLevel::Info);
        assert_eq!(Logging::debug().level, LogLevel::Debug);
    }

    #[tokio::test]
    async fn logging_is_transparent() {
        let transport = FnTransport::new(|_request: Request, _configs: Configs| async {
            Ok::<_, Error>(Response::from_status(503, "busy"))
        });
        let request = Request::new(Method::Get, "https://example.com/".parse().expect("url"));

        for level in [LogLevel::Off, LogLevel::Debug, LogLevel::Info] {
            let response = Logging::with_level(level)
                .handle(request.clone(), &Configs::new(), Next::new(&[], &transport))
                .await
                .expect("response");
            assert_eq!(response.status(), 503);
        }
    }
}
