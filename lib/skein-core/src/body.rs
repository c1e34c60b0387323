//! Request bodies and the encoder/decoder collaborators.
//!
//! Encoders and decoders exchange [`serde_json::Value`] so they can be stored
//! as trait objects in [`Configs`] and swapped per client. The defaults are
//! JSON for bodies, URL query pairs with repeated keys for queries and a flat
//! encoder for headers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{ConfigKey, Configs, Error, Result};

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Form URL-encoded content type (`application/x-www-form-urlencoded`).
    FormUrlEncoded,
    /// Plain text content type (`text/plain`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request body: in-memory bytes or a file to stream from disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Body {
    /// In-memory payload.
    Bytes(Bytes),
    /// Payload read from a file by the transport.
    File(PathBuf),
}

impl Body {
    /// The in-memory payload, if any.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::File(_) => None,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Encodes a value into a request body.
pub trait BodyEncoder: Send + Sync + 'static {
    /// Content type announced for encoded bodies.
    fn content_type(&self) -> ContentType;

    /// Encode `value` into bytes.
    fn encode(&self, value: &Value, configs: &Configs) -> Result<Bytes>;
}

/// Encodes a value into query `(name, value)` pairs.
pub trait QueryEncoder: Send + Sync + 'static {
    /// Encode `value` into query pairs.
    fn encode(&self, value: &Value, configs: &Configs) -> Result<Vec<(String, String)>>;
}

/// Encodes a value into header `(name, value)` pairs.
pub trait HeaderEncoder: Send + Sync + 'static {
    /// Encode `value` into header pairs.
    fn encode(&self, value: &Value, configs: &Configs) -> Result<Vec<(String, String)>>;
}

/// Decodes a response body.
pub trait BodyDecoder: Send + Sync + 'static {
    /// Decode `bytes` into a value tree.
    fn decode(&self, bytes: &Bytes, configs: &Configs) -> Result<Value>;
}

// ============================================================================
// Default implementations
// ============================================================================

/// JSON body encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl BodyEncoder for JsonEncoder {
    fn content_type(&self) -> ContentType {
        ContentType::Json
    }

    fn encode(&self, value: &Value, _configs: &Configs) -> Result<Bytes> {
        to_json(value)
    }
}

/// Form URL-encoded body encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormEncoder;

impl BodyEncoder for FormEncoder {
    fn content_type(&self) -> ContentType {
        ContentType::FormUrlEncoded
    }

    fn encode(&self, value: &Value, _configs: &Configs) -> Result<Bytes> {
        to_form(value)
    }
}

/// How arrays are written into query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayEncoding {
    /// `tags=a&tags=b`
    #[default]
    RepeatKey,
    /// `tags[]=a&tags[]=b`
    Brackets,
    /// `tags=a,b`
    CommaSeparated,
}

/// URL query encoder.
///
/// Nested objects use bracket notation (`filter[state]=open`), `null` values
/// are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlQueryEncoder {
    arrays: ArrayEncoding,
}

impl UrlQueryEncoder {
    /// Create an encoder with the given array strategy.
    #[must_use]
    pub const fn new(arrays: ArrayEncoding) -> Self {
        Self { arrays }
    }
}

impl QueryEncoder for UrlQueryEncoder {
    fn encode(&self, value: &Value, _configs: &Configs) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for (name, value) in top_level_object(value, "query")? {
            flatten_query(name, value, self.arrays, &mut pairs)?;
        }
        Ok(pairs)
    }
}

/// Header encoder mapping top-level fields to header names.
///
/// Arrays are comma-joined; nested objects are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatHeaderEncoder;

impl HeaderEncoder for FlatHeaderEncoder {
    fn encode(&self, value: &Value, _configs: &Configs) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for (name, value) in top_level_object(value, "headers")? {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .map(|item| scalar(name, item))
                        .collect::<Result<Vec<_>>>()?
                        .join(",");
                    pairs.push((name.clone(), joined));
                }
                other => pairs.push((name.clone(), scalar(name, other)?)),
            }
        }
        Ok(pairs)
    }
}

/// JSON body decoder. An empty body decodes to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl BodyDecoder for JsonDecoder {
    fn decode(&self, bytes: &Bytes, _configs: &Configs) -> Result<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        from_json(bytes)
    }
}

/// Form URL-encoded body decoder. Repeated keys become arrays of strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormDecoder;

impl BodyDecoder for FormDecoder {
    fn decode(&self, bytes: &Bytes, _configs: &Configs) -> Result<Value> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
            .map_err(|e| Error::decode("", e.to_string()))?;

        let mut map = Map::new();
        for (name, value) in pairs {
            let value = Value::String(value);
            match map.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name, value);
                }
            }
        }
        Ok(Value::Object(map))
    }
}

fn top_level_object<'v>(value: &'v Value, what: &str) -> Result<Vec<(&'v String, &'v Value)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.iter().collect()),
        other => Err(Error::encode(format!(
            "{what} must encode to an object, got {other}"
        ))),
    }
}

fn scalar(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(Error::encode(format!(
            "`{name}` must be a scalar value"
        ))),
    }
}

fn flatten_query(
    name: &str,
    value: &Value,
    arrays: ArrayEncoding,
    pairs: &mut Vec<(String, String)>,
) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Array(items) => match arrays {
            ArrayEncoding::RepeatKey => {
                for item in items {
                    pairs.push((name.to_string(), scalar(name, item)?));
                }
            }
            ArrayEncoding::Brackets => {
                let key = format!("{name}[]");
                for item in items {
                    pairs.push((key.clone(), scalar(name, item)?));
                }
            }
            ArrayEncoding::CommaSeparated => {
                let joined = items
                    .iter()
                    .map(|item| scalar(name, item))
                    .collect::<Result<Vec<_>>>()?
                    .join(",");
                pairs.push((name.to_string(), joined));
            }
        },
        Value::Object(map) => {
            for (field, value) in map {
                flatten_query(&format!("{name}[{field}]"), value, arrays, pairs)?;
            }
        }
        other => pairs.push((name.to_string(), scalar(name, other)?)),
    }
    Ok(())
}

// ============================================================================
// Config slots
// ============================================================================

/// Slot for the request body encoder.
pub struct BodyEncoderKey;

impl ConfigKey for BodyEncoderKey {
    type Value = Arc<dyn BodyEncoder>;

    fn default_value() -> Self::Value {
        Arc::new(JsonEncoder)
    }
}

/// Slot for the query encoder.
pub struct QueryEncoderKey;

impl ConfigKey for QueryEncoderKey {
    type Value = Arc<dyn QueryEncoder>;

    fn default_value() -> Self::Value {
        Arc::new(UrlQueryEncoder::default())
    }
}

/// Slot for the header encoder.
pub struct HeaderEncoderKey;

impl ConfigKey for HeaderEncoderKey {
    type Value = Arc<dyn HeaderEncoder>;

    fn default_value() -> Self::Value {
        Arc::new(FlatHeaderEncoder)
    }
}

/// Slot for the response body decoder.
pub struct BodyDecoderKey;

impl ConfigKey for BodyDecoderKey {
    type Value = Arc<dyn BodyDecoder>;

    fn default_value() -> Self::Value {
        Arc::new(JsonDecoder)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Serialize a value to JSON bytes.
///
/// # Example
///
/// ```
/// use skein_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { name: String }
///
/// let user = User { name: "Alice".to_string() };
/// let bytes = to_json(&user).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"Alice"}"#);
/// ```
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::encode(e.to_string()))
}

/// Serialize a value to form URL-encoded bytes.
///
/// Uses `serde_html_form`, so `Vec<T>` fields become repeated keys.
pub fn to_form<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_html_form::to_string(value)
        .map(|s| Bytes::from(s.into_bytes()))
        .map_err(|e| Error::encode(e.to_string()))
}

/// Serialize a value to a query string.
///
/// ```
/// use skein_core::to_query_string;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Search {
///     q: String,
///     #[serde(skip_serializing_if = "Option::is_none")]
///     page: Option<u32>,
/// }
///
/// let search = Search { q: "rust".to_string(), page: Some(1) };
/// assert_eq!(to_query_string(&search).expect("serialize"), "q=rust&page=1");
/// ```
pub fn to_query_string<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_html_form::to_string(value).map_err(|e| Error::encode(e.to_string()))
}

/// Deserialize JSON bytes with path-aware error messages.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| Error::decode(e.path().to_string(), e.inner().to_string()))
}

/// Deserialize a decoded value tree into `T` with path-aware error messages.
pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_path_to_error::deserialize(value)
        .map_err(|e| Error::decode(e.path().to_string(), e.inner().to_string()))
}

/// Convert a serializable value into the tree handed to encoders.
pub fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::encode(e.to_string()))
}
