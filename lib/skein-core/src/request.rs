//! HTTP request descriptor.
//!
//! A [`Request`] is produced fresh for every call and handed through the
//! middleware chain by value. Use [`Request::builder`] to assemble one by hand.
//!
//! # Example
//!
//! ```
//! use skein_core::{Method, Request};
//!
//! let url = "https://api.example.com/users".parse().expect("valid URL");
//! let request = Request::builder(Method::Get, url)
//!     .header("accept", "application/json")
//!     .query("page", "1")
//!     .build()
//!     .expect("valid request");
//!
//! assert_eq!(request.url().as_str(), "https://api.example.com/users?page=1");
//! ```

use http::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::{Body, Error, Method, Result};

/// An HTTP request with method, URL, headers and optional body.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
}

impl Request {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Replace the HTTP method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable access to the URL.
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = Some(body.into());
    }

    /// Take the body out, leaving none.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Host of the target URL, or an empty string.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, Url, HeaderMap, Option<Body>) {
        (self.method, self.url, self.headers, self.body)
    }

    /// Rebuild from parts.
    #[must_use]
    pub fn from_parts(method: Method, url: Url, headers: HeaderMap, body: Option<Body>) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }
}

/// Builder for hand-assembled [`Request`] values.
///
/// Invalid header names or values are recorded and reported by
/// [`RequestBuilder::build`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
    error: Option<Error>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            request: Request::new(method, url),
            error: None,
        }
    }

    /// Sets a header, replacing existing values.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.request.headers.insert(name, value);
            }
            Err(err) => self.fail(err),
        }
        self
    }

    /// Adds a header value, keeping existing values.
    #[must_use]
    pub fn append_header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.request.headers.append(name, value);
            }
            Err(err) => self.fail(err),
        }
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.request.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Appends multiple query parameters to the URL.
    #[must_use]
    pub fn query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        {
            let mut query = self.request.url.query_pairs_mut();
            for (name, value) in pairs {
                query.append_pair(&name, &value);
            }
        }
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> Self {
        match crate::to_json(value) {
            Ok(body) => self.header("content-type", "application/json").body(body),
            Err(err) => {
                let mut this = self;
                this.fail(err);
                this
            }
        }
    }

    /// Builds the [`Request`], reporting the first recorded failure.
    pub fn build(self) -> Result<Request> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }

    fn fail(&mut self, err: Error) {
        self.error.get_or_insert(err);
    }
}

/// Parse a header name and value pair.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::try_from(name)
        .map_err(|e| Error::request_build(format!("invalid header name `{name}`: {e}")))?;
    let header_value = HeaderValue::try_from(value)
        .map_err(|e| Error::request_build(format!("invalid value for header `{name}`: {e}")))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn url() -> Url {
        Url::parse("https://api.example.com/users").expect("valid URL")
    }

    #[test]
    fn request_builder_basic() {
        let request = Request::builder(Method::Get, url())
            .header("Accept", "application/json")
            .build()
            .expect("build");

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url().as_str(), "https://api.example.com/users");
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.host(), "api.example.com");
        assert!(request.body().is_none());
    }

    #[test]
    fn request_builder_with_query() {
        let request = Request::builder(Method::Get, url())
            .query("page", "1")
            .query("limit", "10")
            .build()
            .expect("build");

        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/users?page=1&limit=10"
        );
    }

    #[test]
    fn request_builder_append_keeps_values() {
        let request = Request::builder(Method::Get, url())
            .append_header("x-tag", "a")
            .append_header("x-tag", "b")
            .build()
            .expect("build");

        let values: Vec<_> = request.headers().get_all("x-tag").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn request_builder_reports_invalid_header() {
        let err = Request::builder(Method::Get, url())
            .header("bad header", "x")
            .header("x-ok", "fine")
            .build()
            .expect_err("invalid name");
        assert!(err.is_request_build());
        assert!(err.to_string().contains("bad header"));
    }

    #[test]
    fn request_builder_json() {
        #[derive(serde::Serialize)]
        struct User {
            name: String,
        }

        let request = Request::builder(Method::Post, url())
            .json(&User {
                name: "test".to_string(),
            })
            .build()
            .expect("build");

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body().and_then(Body::as_bytes),
            Some(&Bytes::from_static(br#"{"name":"test"}"#))
        );
    }

    #[test]
    fn take_body_leaves_none() {
        let mut request = Request::new(Method::Put, url());
        request.set_body("payload");
        assert!(request.take_body().is_some());
        assert!(request.body().is_none());
    }
}
