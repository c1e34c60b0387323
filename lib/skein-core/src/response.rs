//! Transport responses and shaped call results.
//!
//! The transport yields a `Response<Bytes>`; a caller may hand back a
//! `Response<T>` carrying the decoded body with the original status and
//! headers.

use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;

/// Status, headers and a body of type `B`.
#[derive(Debug, Clone)]
pub struct Response<B = Bytes> {
    status: u16,
    headers: HeaderMap,
    body: B,
}

impl<B> Response<B> {
    /// Creates a response.
    #[must_use]
    pub const fn new(status: u16, headers: HeaderMap, body: B) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Numeric status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of the header `name`, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The `content-type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Consume into the body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }

    /// Split into status, headers and body.
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderMap, B) {
        (self.status, self.headers, self.body)
    }

    /// `true` for 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }

    /// Keep status and headers, replace the body.
    pub fn map_body<B2>(self, f: impl FnOnce(B) -> B2) -> Response<B2> {
        let (status, headers, body) = self.into_parts();
        Response::new(status, headers, f(body))
    }
}

impl Response<Bytes> {
    /// A response with no headers.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, HeaderMap::new(), body.into())
    }

    /// Decode the body as JSON, reporting the failing field path.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        crate::from_json(&self.body)
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> crate::Result<String> {
        std::str::from_utf8(&self.body)
            .map(str::to_owned)
            .map_err(|err| crate::Error::decode("", format!("body is not UTF-8: {err}")))
    }
}
