//! HTTP methods.

use std::fmt;
use std::str::FromStr;

/// HTTP request method. Defaults to `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `TRACE`
    Trace,
}

impl Method {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }

    /// Safe methods have no side effects on the server and may be retried
    /// without the caller's consent.
    #[must_use]
    pub const fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    /// Case-insensitive.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let method = match name.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            _ => {
                return Err(crate::Error::request_build(format!(
                    "unsupported HTTP method: {name}"
                )));
            }
        };
        Ok(method)
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
            Method::Head => Self::HEAD,
            Method::Options => Self::OPTIONS,
            Method::Trace => Self::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(Method::default().to_string(), "GET");
        assert_eq!(Method::Options.as_str(), "OPTIONS");
        assert_eq!(http::Method::from(Method::Trace), http::Method::TRACE);
    }

    #[test]
    fn parse_ignores_case() {
        assert_eq!("patch".parse::<Method>().ok(), Some(Method::Patch));
        assert_eq!("Delete".parse::<Method>().ok(), Some(Method::Delete));
        assert!("CONNECT".parse::<Method>().is_err_and(|err| err.is_request_build()));
    }

    #[test]
    fn only_reading_methods_are_safe() {
        let safe: Vec<_> = [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Patch,
            Method::Head,
            Method::Options,
            Method::Trace,
        ]
        .into_iter()
        .filter(|method| method.is_safe())
        .collect();
        assert_eq!(safe, [Method::Get, Method::Head, Method::Options, Method::Trace]);
    }
}
