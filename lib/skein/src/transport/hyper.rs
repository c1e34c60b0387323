//! Network transport using hyper-util and rustls.

use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use skein_core::{Body, BoxFuture, Configs, Error, Request, Response, Result, Transport};
use tower_service::Service;

use super::connector::https_connector;
use crate::config::{TransportConfig, TransportConfigBuilder};

/// HTTP transport with connection pooling and TLS.
///
/// Applies its own request timeout from [`TransportConfig`] on top of any
/// timeout middleware in the chain.
///
/// ```ignore
/// use skein::{HyperTransport, TransportConfig};
/// use std::time::Duration;
///
/// let transport = HyperTransport::builder()
///     .timeout(Duration::from_secs(10))
///     .pool_idle_per_host(8)
///     .build();
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: TransportConfig,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a transport with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    /// Create a transport with custom configuration.
    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        let connector = https_connector(config.connect_timeout);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(connector);

        Self { inner, config }
    }

    /// Create a transport builder.
    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    /// The process-wide default transport, created on first use.
    #[must_use]
    pub fn shared() -> Arc<dyn Transport> {
        static SHARED: OnceLock<Arc<HyperTransport>> = OnceLock::new();
        let shared = SHARED.get_or_init(|| Arc::new(Self::new()));
        Arc::clone(shared) as Arc<dyn Transport>
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn build_hyper_request(&self, request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, mut headers, body) = request.into_parts();
        self.config.fill_defaults(&mut headers);

        let body = match body {
            None => Full::default(),
            Some(Body::Bytes(bytes)) => Full::new(bytes),
            Some(Body::File(path)) => {
                let contents = tokio::fs::read(&path).await.map_err(|e| {
                    Error::request_build(format!("cannot read body file {}: {e}", path.display()))
                })?;
                Full::new(Bytes::from(contents))
            }
        };

        let mut http_request = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str())
            .body(body)
            .map_err(|e| Error::request_build(e.to_string()))?;
        *http_request.headers_mut() = headers;

        Ok(http_request)
    }

    async fn execute(&self, request: Request) -> Result<Response<Bytes>> {
        let hyper_request = self.build_hyper_request(request).await?;
        let timeout = self.config.timeout;

        let exchange = async {
            let response = self
                .inner
                .request(hyper_request)
                .await
                .map_err(Self::map_hyper_error)?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| Error::transport(e.to_string()))?
                .to_bytes();

            Ok::<_, Error>(Response::new(parts.status.as_u16(), parts.headers, body))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::transport(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::transport(msg)
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send<'a>(
        &'a self,
        request: Request,
        _configs: &'a Configs,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        Box::pin(self.execute(request))
    }
}

impl Service<Request> for HyperTransport {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response<Bytes>>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}

/// Builder for [`HyperTransport`].
#[derive(Debug, Default)]
pub struct HyperTransportBuilder {
    config: TransportConfigBuilder,
}

impl HyperTransportBuilder {
    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Add or replace a header sent with every request that lacks it.
    pub fn default_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.config = self.config.default_header(name, value)?;
        Ok(self)
    }

    /// Build the transport.
    #[must_use]
    pub fn build(self) -> HyperTransport {
        HyperTransport::with_config(self.config.build())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skein_core::Method;

    use super::*;

    #[test]
    fn transport_default() {
        let transport = HyperTransport::new();
        assert_eq!(transport.config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn transport_builder() {
        let transport = HyperTransport::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(16)
            .build();

        assert_eq!(transport.config().timeout, Duration::from_secs(60));
        assert_eq!(transport.config().pool_idle_per_host, 16);
    }

    #[test]
    fn transport_is_debug() {
        let debug = format!("{:?}", HyperTransport::new());
        assert!(debug.contains("HyperTransport"));
    }

    #[tokio::test]
    async fn file_body_is_read_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("payload.txt");
        std::fs::write(&path, "from disk").expect("write");

        let url = "http://localhost/upload".parse().expect("url");
        let mut request = Request::new(Method::Put, url);
        request.set_body(Body::File(path));

        let http_request = HyperTransport::new()
            .build_hyper_request(request)
            .await
            .expect("build");
        let bytes = http_request
            .into_body()
            .collect()
            .await
            .expect("collect")
            .to_bytes();
        assert_eq!(bytes.as_ref(), b"from disk");
    }

    #[tokio::test]
    async fn default_headers_fill_gaps_only() {
        let transport = HyperTransport::builder()
            .default_header("x-client", "tests")
            .expect("valid header")
            .build();
        let request = Request::builder(Method::Get, "http://localhost/".parse().expect("url"))
            .header("x-client", "explicit")
            .build()
            .expect("request");

        let http_request = transport.build_hyper_request(request).await.expect("build");
        let headers = http_request.headers();
        assert_eq!(headers.get("x-client").and_then(|v| v.to_str().ok()), Some("explicit"));
        assert!(
            headers
                .get(http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|agent| agent.starts_with("skein/"))
        );
    }

    #[tokio::test]
    async fn missing_file_is_a_build_error() {
        let url = "http://localhost/upload".parse().expect("url");
        let mut request = Request::new(Method::Put, url);
        request.set_body(Body::File("/definitely/not/here.bin".into()));

        let err = HyperTransport::new()
            .build_hyper_request(request)
            .await
            .expect_err("missing file");
        assert!(err.is_request_build());
    }
}
