use std::convert::TryFrom;
use std::fmt::Display;

use http::{HeaderMap, Method};
use url::Url;

use crate::ratelimit::HostKey;
use crate::{ErrorKind, Result};

/// A request type that can be handled by the fetch scheduler.
///
/// Requests are immutable once submitted: the builder-style methods below
/// consume and return `self`, and the scheduler never mutates a request
/// after accepting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// A valid Uniform Resource Locator of the endpoint to fetch
    pub url: Url,

    /// HTTP method used for the request, e.g. `GET` or `HEAD`
    pub method: Method,

    /// Additional headers sent with the request
    pub headers: HeaderMap,
}

impl FetchRequest {
    /// Instantiate a new `FetchRequest` with the default `GET` method
    /// and no extra headers
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
        }
    }

    /// Set the HTTP method used for this request
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the headers sent with this request
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// The host authority this request targets, which is the unit of
    /// rate limiting and per-target concurrency.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL has no host (e.g. `file:///...`).
    pub fn host_key(&self) -> Result<HostKey> {
        HostKey::try_from(&self.url)
    }
}

impl Display for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

impl TryFrom<&str> for FetchRequest {
    type Error = ErrorKind;

    fn try_from(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| ErrorKind::from((s.to_string(), e)))?;
        Ok(Self::new(url))
    }
}

impl TryFrom<String> for FetchRequest {
    type Error = ErrorKind;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(s.as_str())
    }
}

impl From<Url> for FetchRequest {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_str() {
        let request = FetchRequest::try_from("https://example.com/page").unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.as_str(), "https://example.com/page");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_request_invalid_url() {
        let result = FetchRequest::try_from("not a url");
        assert!(matches!(result, Err(ErrorKind::UrlParseError(_, _))));
    }

    #[test]
    fn test_request_host_key() {
        let request = FetchRequest::try_from("https://example.com/page").unwrap();
        assert_eq!(request.host_key().unwrap().as_str(), "https://example.com:443");
    }

    #[test]
    fn test_request_without_host() {
        let request = FetchRequest::try_from("data:text/plain,hello").unwrap();
        assert!(request.host_key().is_err());
    }

    #[test]
    fn test_request_with_method() {
        let request = FetchRequest::try_from("https://example.com")
            .unwrap()
            .with_method(Method::HEAD);
        assert_eq!(request.method, Method::HEAD);
    }
}
