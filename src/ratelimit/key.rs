use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::Result;
use crate::ErrorKind;

/// A type-safe representation of a host authority for rate limiting.
///
/// The authority is the network endpoint a request targets: scheme, host,
/// and port, normalized to `scheme://host:port` with a lowercase host and
/// the scheme's default port filled in. Requests with the same authority
/// share rate limiting and the per-target concurrency cap.
///
/// # Examples
///
/// ```
/// use politefetch::ratelimit::HostKey;
/// use url::Url;
///
/// let url = Url::parse("https://api.github.com/repos/user/repo").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.as_str(), "https://api.github.com:443");
/// assert_eq!(host_key.host(), "api.github.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostKey {
    authority: String,
    host: String,
}

impl HostKey {
    /// Get the full authority (`scheme://host:port`) as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.authority
    }

    /// Get the hostname component, without scheme or port
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::InvalidUrlHost(url.clone()))?
            .to_lowercase();

        // Urls without a known default port (e.g. custom schemes) keep
        // a portless authority rather than failing.
        let authority = match url.port_or_known_default() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };

        Ok(HostKey { authority, host })
    }
}

impl TryFrom<Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        HostKey::try_from(&url)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.authority)
    }
}
