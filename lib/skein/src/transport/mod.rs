//! Network transports and the transport config slot.

#[cfg(feature = "hyper")]
mod connector;
#[cfg(feature = "hyper")]
mod hyper;
mod service;

use std::sync::Arc;

#[cfg(feature = "hyper")]
pub use connector::https_connector;
#[cfg(feature = "hyper")]
pub use hyper::{HyperTransport, HyperTransportBuilder};
pub use service::ServiceTransport;
pub use skein_core::{FnTransport, Transport};

use skein_core::ConfigKey;

/// Slot holding the transport at the end of the middleware chain.
///
/// Defaults to the shared [`HyperTransport`] when the `hyper` feature is on.
pub struct TransportKey;

impl ConfigKey for TransportKey {
    type Value = Arc<dyn Transport>;

    #[cfg(feature = "hyper")]
    fn default_value() -> Self::Value {
        HyperTransport::shared()
    }

    #[cfg(not(feature = "hyper"))]
    fn default_value() -> Self::Value {
        Arc::new(Unconfigured)
    }
}

/// Fails every request; installed when no network transport is compiled in.
#[cfg(not(feature = "hyper"))]
struct Unconfigured;

#[cfg(not(feature = "hyper"))]
impl Transport for Unconfigured {
    fn send<'a>(
        &'a self,
        _request: skein_core::Request,
        _configs: &'a skein_core::Configs,
    ) -> skein_core::BoxFuture<'a, skein_core::Result<skein_core::Response>> {
        Box::pin(std::future::ready(Err(skein_core::Error::transport(
            "no transport configured",
        ))))
    }
}
