//! Adapter turning any tower [`Service`] into a [`Transport`].

use bytes::Bytes;
use skein_core::{BoxFuture, Configs, Error, Request, Response, Result, Transport};
use tower::ServiceExt;
use tower_service::Service;

/// Runs requests through a cloned tower service, one `oneshot` per call.
///
/// Lets tower layers (`map_request`, `map_response`, ...) or test doubles
/// built with [`tower::service_fn`] sit at the end of the chain.
///
/// ```ignore
/// use skein::{Client, transport::ServiceTransport};
/// use tower::ServiceBuilder;
///
/// let transport = ServiceBuilder::new()
///     .map_request(|request| request)
///     .service(skein::HyperTransport::new());
/// let client = Client::new(base).transport(ServiceTransport::new(transport));
/// ```
#[derive(Debug, Clone)]
pub struct ServiceTransport<S> {
    service: S,
}

impl<S> ServiceTransport<S> {
    /// Wrap a service.
    pub const fn new(service: S) -> Self {
        Self { service }
    }

    /// The wrapped service.
    pub const fn get_ref(&self) -> &S {
        &self.service
    }
}

impl<S> Transport for ServiceTransport<S>
where
    S: Service<Request, Response = Response<Bytes>, Error = Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn send<'a>(
        &'a self,
        request: Request,
        _configs: &'a Configs,
    ) -> BoxFuture<'a, Result<Response<Bytes>>> {
        let service = self.service.clone();
        Box::pin(service.oneshot(request))
    }
}
