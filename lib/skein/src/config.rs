//! Settings of the default network transport.
//!
//! Per-call behavior lives in [`skein_core::Configs`]; these settings are
//! fixed when the transport and its connection pool are created.

use std::time::Duration;

use http::HeaderMap;
use http::header::USER_AGENT;
use skein_core::{Result, parse_header};

/// Settings of [`crate::HyperTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Deadline for one exchange, response body included.
    pub timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Idle connections kept per host.
    pub pool_idle_per_host: usize,
    /// How long an idle connection is kept.
    pub pool_idle_timeout: Duration,
    /// Headers added to requests that do not set them.
    pub default_headers: HeaderMap,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            http::HeaderValue::from_static(concat!("skein/", env!("CARGO_PKG_VERSION"))),
        );
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            default_headers,
        }
    }
}

impl TransportConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Copy every default header missing from `headers`.
    pub fn fill_defaults(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the exchange deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect deadline.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the idle pool size per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config.pool_idle_per_host = count;
        self
    }

    /// Set the idle connection lifetime.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Add or replace a default header.
    pub fn default_header(mut self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        self.config.default_headers.insert(name, value);
        Ok(self)
    }

    /// Drop every default header, the user agent included.
    #[must_use]
    pub fn no_default_headers(mut self) -> Self {
        self.config.default_headers.clear();
        self
    }

    /// Finish the configuration.
    #[must_use]
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn defaults() {
        let config = TransportConfig::default();
        check!(config.timeout == Duration::from_secs(30));
        check!(config.connect_timeout == Duration::from_secs(10));
        check!(config.pool_idle_per_host == 32);
        check!(config.pool_idle_timeout == Duration::from_secs(90));
        let agent = config.default_headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
        check!(agent.is_some_and(|agent| agent.starts_with("skein/")));
    }

    #[test]
    fn builder_keeps_unset_defaults() {
        let config = TransportConfig::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(4)
            .build();

        check!(config.timeout == Duration::from_secs(60));
        check!(config.connect_timeout == Duration::from_secs(10));
        check!(config.pool_idle_per_host == 4);
    }

    #[test]
    fn defaults_never_override_request_headers() {
        let config = TransportConfig::builder()
            .default_header("x-client", "skein-tests")
            .expect("valid header")
            .build();

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, http::HeaderValue::from_static("custom/1.0"));
        config.fill_defaults(&mut headers);

        check!(headers.get(USER_AGENT).is_some_and(|v| v == "custom/1.0"));
        check!(headers.get("x-client").is_some_and(|v| v == "skein-tests"));
    }

    #[test]
    fn invalid_default_header_is_rejected() {
        let err = TransportConfig::builder().default_header("bad name", "x");
        check!(err.is_err_and(|err| err.is_request_build()));
        check!(TransportConfig::builder().no_default_headers().build().default_headers.is_empty());
    }
}
