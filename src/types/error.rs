use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Possible errors when interacting with `politefetch`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Any form of I/O error occurred while reading from a given path
    #[error("Failed to read from path: `{path}`, reason: {1}", path = match .0 {
        Some(p) => p.to_str().unwrap_or("<MALFORMED PATH>"),
        None => "<MALFORMED PATH>",
    })]
    IoError(Option<PathBuf>, std::io::Error),
    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse {0} as URL: ({1})")]
    UrlParseError(String, url::ParseError),
    /// A URL without a host was submitted for fetching
    #[error("URL is missing a host: {0}")]
    InvalidUrlHost(Url),
    /// The given header could not be parsed
    #[error("Header could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// The request client could not be built
    #[error("Error creating request client")]
    BuildRequestClient(#[source] reqwest::Error),
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(None, e)
    }
}

impl From<(PathBuf, std::io::Error)> for ErrorKind {
    fn from(value: (PathBuf, std::io::Error)) -> Self {
        Self::IoError(Some(value.0), value.1)
    }
}

impl From<(String, url::ParseError)> for ErrorKind {
    fn from(value: (String, url::ParseError)) -> Self {
        Self::UrlParseError(value.0, value.1)
    }
}

/// Terminal failure classification for a fetch.
///
/// This is the taxonomy surfaced to callers inside
/// [`FetchStatus::Failed`](crate::FetchStatus): it distinguishes transient
/// conditions (which the scheduler retries with backoff) from permanent
/// ones (which fail immediately). The string payloads exist because
/// `reqwest::Error` is neither `Clone` nor comparable, and results must be
/// freely movable across the result channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request exceeded its deadline. Retryable.
    Timeout,
    /// The server answered with a non-success status code.
    /// Retryable for 429 and 5xx, permanent otherwise.
    Status(u16),
    /// A network-level error (connection reset, DNS failure, ...).
    Network {
        /// Human-readable error description
        reason: String,
        /// Whether the underlying condition was classified as transient
        retryable: bool,
    },
    /// The request could not be dispatched at all, e.g. the URL has no
    /// host. Never retried.
    InvalidRequest(String),
}

impl FailureKind {
    /// Whether the scheduler may retry a fetch that failed with this kind
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        use crate::retry::RetryExt;
        self.should_retry()
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Timeout"),
            Self::Status(code) => match http::StatusCode::from_u16(*code) {
                Ok(status) => write!(
                    f,
                    "HTTP {} {}",
                    code,
                    status.canonical_reason().unwrap_or("")
                ),
                Err(_) => write!(f, "HTTP {code}"),
            },
            Self::Network { reason, .. } => write!(f, "Network error: {reason}"),
            Self::InvalidRequest(reason) => write!(f, "Invalid request: {reason}"),
        }
    }
}

/// The politefetch `Result` type
pub type Result<T> = std::result::Result<T, ErrorKind>;
