//! Core types and collaborator traits for the skein HTTP client engine.
//!
//! This crate provides the value types the engine passes around and the
//! boundaries it plugs strategies into:
//! - [`Configs`] and [`ConfigKey`] - the immutable, typed configuration store
//! - [`Method`], [`Request`] and [`Body`] - the request descriptor
//! - [`Response`] - HTTP response type
//! - [`Error`] and [`Result`] - Error handling
//! - [`BodyEncoder`], [`QueryEncoder`], [`HeaderEncoder`], [`BodyDecoder`] - codecs
//! - [`Serializer`] - turns an accepted response into a value
//! - [`Transport`] - the network round trip at the end of the chain
//! - [`StatusCode`] and [`header`] - re-exported from the `http` crate

mod body;
mod configs;
mod error;
mod method;
pub mod prelude;
mod request;
mod response;
mod serializer;
mod transport;

pub use body::{
    ArrayEncoding, Body, BodyDecoder, BodyDecoderKey, BodyEncoder, BodyEncoderKey, ContentType,
    FlatHeaderEncoder, FormDecoder, FormEncoder, HeaderEncoder, HeaderEncoderKey, JsonDecoder,
    JsonEncoder, QueryEncoder, QueryEncoderKey, UrlQueryEncoder, from_json, from_value, to_form,
    to_json, to_query_string, to_value,
};
pub use configs::{ConfigKey, Configs};
pub use error::{Error, Result};
pub use method::Method;
pub use request::{Request, RequestBuilder, parse_header};
pub use response::Response;
pub use serializer::{Decodable, Raw, RawBytes, Serializer, Text, Unit};
pub use transport::{BoxFuture, FnTransport, Transport};

// Re-export http crate types for status codes and headers
pub use http::{HeaderMap, StatusCode, header};
