use std::fmt::Display;
use std::time::SystemTime;

use http::HeaderMap;

use crate::FailureKind;
use crate::cache::CacheEntry;
use crate::types::FetchRequest;

const ICON_OK: &str = "✔";
const ICON_CACHED: &str = "↻";
const ICON_ERROR: &str = "✗";
const ICON_CANCELLED: &str = "⊘";

/// A successful response fetched over the network
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// HTTP status code of the response
    pub status_code: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: String,
    /// When the response was received
    pub fetched_at: SystemTime,
}

/// Terminal outcome of a fetch.
///
/// Every submitted [`FetchRequest`] resolves to exactly one of these.
#[derive(Debug, Clone)]
pub enum FetchStatus {
    /// The request succeeded over the network. Carries the total number
    /// of attempts, including the successful one.
    Fetched(FetchedResponse, u32),
    /// The result was produced from the response cache without network I/O
    Cached(CacheEntry),
    /// The request failed and will not be retried further. Carries the
    /// failure classification and the number of attempts made.
    Failed(FailureKind, u32),
    /// The run was cancelled before this request completed
    Cancelled,
}

impl FetchStatus {
    /// Whether the fetch produced a usable response (fetched or cached)
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched(_, _) | Self::Cached(_))
    }

    /// Whether the result was served from the response cache
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    /// The response body, if the fetch produced one
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Fetched(response, _) => Some(&response.body),
            Self::Cached(entry) => Some(&entry.body),
            _ => None,
        }
    }

    /// The HTTP status code, if the fetch produced one
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Fetched(response, _) => Some(response.status_code),
            Self::Cached(entry) => Some(entry.status_code),
            Self::Failed(FailureKind::Status(code), _) => Some(*code),
            _ => None,
        }
    }

    /// Number of network attempts made for this request.
    /// Zero for cache hits and requests cancelled before dispatch.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fetched(_, attempts) | Self::Failed(_, attempts) => *attempts,
            Self::Cached(_) | Self::Cancelled => 0,
        }
    }

    const fn icon(&self) -> &str {
        match self {
            Self::Fetched(_, _) => ICON_OK,
            Self::Cached(_) => ICON_CACHED,
            Self::Failed(_, _) => ICON_ERROR,
            Self::Cancelled => ICON_CANCELLED,
        }
    }
}

impl Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetched(response, attempts) => {
                write!(f, "{} ({attempts} attempt(s))", response.status_code)
            }
            Self::Cached(entry) => write!(f, "{} (cached)", entry.status_code),
            Self::Failed(kind, attempts) => write!(f, "{kind} ({attempts} attempt(s))"),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Result type returned by the scheduler for each submitted request
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The request this result belongs to
    pub request: FetchRequest,
    /// Terminal status of the fetch
    pub status: FetchStatus,
}

impl FetchResult {
    /// Create a new fetch result
    #[must_use]
    pub const fn new(request: FetchRequest, status: FetchStatus) -> Self {
        Self { request, status }
    }
}

impl Display for FetchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.status.icon(),
            self.status,
            self.request.url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(code: u16, attempts: u32) -> FetchStatus {
        FetchStatus::Fetched(
            FetchedResponse {
                status_code: code,
                headers: HeaderMap::new(),
                body: "hello".to_string(),
                fetched_at: SystemTime::now(),
            },
            attempts,
        )
    }

    #[test]
    fn test_status_success() {
        assert!(fetched(200, 1).is_success());
        assert!(!FetchStatus::Cancelled.is_success());
        assert!(!FetchStatus::Failed(FailureKind::Timeout, 3).is_success());
    }

    #[test]
    fn test_status_attempts() {
        assert_eq!(fetched(200, 4).attempts(), 4);
        assert_eq!(FetchStatus::Failed(FailureKind::Status(404), 1).attempts(), 1);
        assert_eq!(FetchStatus::Cancelled.attempts(), 0);
    }

    #[test]
    fn test_status_body() {
        assert_eq!(fetched(200, 1).body(), Some("hello"));
        assert_eq!(FetchStatus::Cancelled.body(), None);
    }

    #[test]
    fn test_result_display() {
        let request = FetchRequest::try_from("https://example.com/").unwrap();
        let result = FetchResult::new(request, FetchStatus::Failed(FailureKind::Status(404), 1));
        let rendered = result.to_string();
        assert!(rendered.contains("404"));
        assert!(rendered.contains("https://example.com/"));
    }
}
