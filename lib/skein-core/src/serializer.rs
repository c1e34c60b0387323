//! Response serializers.
//!
//! A [`Serializer`] turns the raw transport response into the decoded value
//! of a call. It runs after the status validator, so it only sees accepted
//! responses.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{BodyDecoderKey, Configs, Response, Result};

/// Decodes an accepted response into a value.
pub trait Serializer: Send + Sync {
    /// The decoded value.
    type Value: Send + 'static;

    /// Decode `response`.
    fn serialize(&self, response: &Response<Bytes>, configs: &Configs) -> Result<Self::Value>;
}

/// Decodes the body with the configured [`crate::BodyDecoder`] into `T`.
pub struct Decodable<T>(PhantomData<fn() -> T>);

impl<T> Decodable<T> {
    /// Creates the serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Decodable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Decodable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Decodable<T> {}

impl<T> fmt::Debug for Decodable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Decodable")
            .field(&std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Serializer for Decodable<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn serialize(&self, response: &Response<Bytes>, configs: &Configs) -> Result<T> {
        let decoder = configs.get::<BodyDecoderKey>();
        let value = decoder.decode(response.body(), configs)?;
        crate::from_value(value)
    }
}

/// Returns the body bytes untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl Serializer for RawBytes {
    type Value = Bytes;

    fn serialize(&self, response: &Response<Bytes>, _configs: &Configs) -> Result<Bytes> {
        Ok(response.body().clone())
    }
}

/// Returns the body as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl Serializer for Text {
    type Value = String;

    fn serialize(&self, response: &Response<Bytes>, _configs: &Configs) -> Result<String> {
        response.text()
    }
}

/// Ignores the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit;

impl Serializer for Unit {
    type Value = ();

    fn serialize(&self, _response: &Response<Bytes>, _configs: &Configs) -> Result<()> {
        Ok(())
    }
}

/// Returns the whole response.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl Serializer for Raw {
    type Value = Response<Bytes>;

    fn serialize(&self, response: &Response<Bytes>, _configs: &Configs) -> Result<Response<Bytes>> {
        Ok(response.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Error, FormDecoder};

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn decodable_uses_json_by_default() {
        let response = Response::from_status(200, r#"{"id":7,"name":"ada"}"#);
        let user = Decodable::<User>::new()
            .serialize(&response, &Configs::new())
            .expect("decode");
        assert_eq!(
            user,
            User {
                id: 7,
                name: "ada".to_string()
            }
        );
    }

    #[test]
    fn decodable_follows_configured_decoder() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Login {
            user: String,
        }

        let configs = Configs::new().with::<BodyDecoderKey>(Arc::new(FormDecoder));
        let response = Response::from_status(200, "user=ada");
        let login = Decodable::<Login>::new()
            .serialize(&response, &configs)
            .expect("decode");
        assert_eq!(login.user, "ada");
    }

    #[test]
    fn decodable_reports_field_path() {
        let response = Response::from_status(200, r#"{"id":"seven","name":"ada"}"#);
        let err = Decodable::<User>::new()
            .serialize(&response, &Configs::new())
            .expect_err("wrong type");
        assert!(matches!(err, Error::Decode { ref path, .. } if path == "id"));
    }

    #[test]
    fn unit_ignores_empty_body() {
        let response = Response::from_status(204, "");
        assert!(Unit.serialize(&response, &Configs::new()).is_ok());
        assert!(
            Decodable::<()>::new()
                .serialize(&response, &Configs::new())
                .is_ok()
        );
    }

    #[test]
    fn raw_and_text() {
        let response = Response::from_status(200, "hello");
        assert_eq!(
            Text.serialize(&response, &Configs::new()).expect("text"),
            "hello"
        );
        assert_eq!(
            RawBytes
                .serialize(&response, &Configs::new())
                .expect("bytes")
                .as_ref(),
            b"hello"
        );
        assert_eq!(
            Raw.serialize(&response, &Configs::new())
                .expect("raw")
                .status(),
            200
        );
    }
}
