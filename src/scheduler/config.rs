use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ratelimit::{HostConfigs, RateLimitConfig};

/// Default number of concurrent fetches across all hosts
const DEFAULT_MAX_CONCURRENCY_GLOBAL: usize = 16;

/// Default maximum number of attempts per request, including the first
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff ceiling before the first retry
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Default upper bound on any single backoff delay
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Default freshness window for cached responses
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default per-fetch deadline
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Default grace period in-flight fetches get to finish after a
/// run-level cancellation
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Default user agent, `politefetch-<PKG_VERSION>`
pub const DEFAULT_USER_AGENT: &str = concat!("politefetch/", env!("CARGO_PKG_VERSION"));

/// Configuration for the fetch scheduler.
///
/// All numeric defaults are deployment-tunable placeholders, chosen on the
/// conservative side (1 request per second per host, 3 attempts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Global per-host spacing and concurrency defaults
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-host-pattern overrides for spacing and concurrency
    #[serde(default)]
    pub host_overrides: HostConfigs,

    /// Maximum number of concurrent fetches across all hosts
    #[serde(default = "default_max_concurrency_global")]
    pub max_concurrency_global: usize,

    /// Maximum number of attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff ceiling before the first retry; doubles per further attempt
    #[serde(default = "default_base_backoff", with = "humantime_serde")]
    pub base_backoff: Duration,

    /// Upper bound on any single backoff delay
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// How long cached responses stay fresh
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Directory backing the response cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Deadline for a single dispatched fetch. Exceeding it counts as a
    /// retryable network failure.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Grace period in-flight fetches get to finish after cancellation
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            host_overrides: HostConfigs::default(),
            max_concurrency_global: default_max_concurrency_global(),
            max_attempts: default_max_attempts(),
            base_backoff: default_base_backoff(),
            max_backoff: default_max_backoff(),
            cache_ttl: default_cache_ttl(),
            cache_dir: default_cache_dir(),
            request_timeout: default_request_timeout(),
            shutdown_grace: default_shutdown_grace(),
            user_agent: default_user_agent(),
        }
    }
}

const fn default_max_concurrency_global() -> usize {
    DEFAULT_MAX_CONCURRENCY_GLOBAL
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_base_backoff() -> Duration {
    DEFAULT_BASE_BACKOFF
}

const fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

const fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("politefetch-cache")
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

const fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
