//! Deterministic request fingerprints used as cache keys.

use std::fmt::Display;

use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};

use crate::types::FetchRequest;

/// SHA-256 hash over the normalized request, hex-encoded.
///
/// The fingerprint is a pure function of (method, URL, headers): identical
/// requests always map to the same fingerprint, regardless of header
/// insertion order. It doubles as the file stem of the cached entry, so it
/// only ever contains lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of the given request
    #[must_use]
    pub fn of(request: &FetchRequest) -> Self {
        let mut context = Context::new(&SHA256);
        context.update(request.method.as_str().as_bytes());
        context.update(b"\n");
        // Url's parser already normalizes the authority (lowercase host,
        // default port elision), so the serialized form is canonical.
        context.update(request.url.as_str().as_bytes());
        context.update(b"\n");

        let mut headers: Vec<(String, &[u8])> = request
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_lowercase(), value.as_bytes()))
            .collect();
        headers.sort();
        for (name, value) in headers {
            context.update(name.as_bytes());
            context.update(b":");
            context.update(value);
            context.update(b"\n");
        }

        Self(hex_encode(context.finish().as_ref()))
    }

    /// Get the fingerprint as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, Method};

    use super::*;

    fn request(url: &str) -> FetchRequest {
        FetchRequest::try_from(url).unwrap()
    }

    #[test]
    fn test_identical_requests_same_fingerprint() {
        assert_eq!(
            Fingerprint::of(&request("https://example.com/a")),
            Fingerprint::of(&request("https://example.com/a"))
        );
    }

    #[test]
    fn test_url_normalization() {
        // Host case and default port do not affect the fingerprint
        assert_eq!(
            Fingerprint::of(&request("https://EXAMPLE.com/a")),
            Fingerprint::of(&request("https://example.com:443/a"))
        );
    }

    #[test]
    fn test_distinct_urls_distinct_fingerprints() {
        assert_ne!(
            Fingerprint::of(&request("https://example.com/a")),
            Fingerprint::of(&request("https://example.com/b"))
        );
    }

    #[test]
    fn test_method_affects_fingerprint() {
        let get = request("https://example.com/a");
        let head = request("https://example.com/a").with_method(Method::HEAD);
        assert_ne!(Fingerprint::of(&get), Fingerprint::of(&head));
    }

    #[test]
    fn test_header_order_does_not_matter() {
        let mut first = HeaderMap::new();
        first.insert("accept", HeaderValue::from_static("text/html"));
        first.insert("x-custom", HeaderValue::from_static("1"));

        let mut second = HeaderMap::new();
        second.insert("x-custom", HeaderValue::from_static("1"));
        second.insert("accept", HeaderValue::from_static("text/html"));

        assert_eq!(
            Fingerprint::of(&request("https://example.com/a").with_headers(first)),
            Fingerprint::of(&request("https://example.com/a").with_headers(second))
        );
    }

    #[test]
    fn test_header_value_affects_fingerprint() {
        let mut first = HeaderMap::new();
        first.insert("accept", HeaderValue::from_static("text/html"));
        let mut second = HeaderMap::new();
        second.insert("accept", HeaderValue::from_static("application/json"));

        assert_ne!(
            Fingerprint::of(&request("https://example.com/a").with_headers(first)),
            Fingerprint::of(&request("https://example.com/a").with_headers(second))
        );
    }

    #[test]
    fn test_fingerprint_is_hex() {
        let fingerprint = Fingerprint::of(&request("https://example.com/a"));
        assert_eq!(fingerprint.as_str().len(), 64);
        assert!(fingerprint.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
