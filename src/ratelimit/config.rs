use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::HostKey;

/// Default minimum interval between requests to the same host.
/// One request per second is a conservative politeness baseline;
/// tune per deployment via [`RateLimitConfig`] or [`HostConfig`].
const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of concurrent requests per host
const DEFAULT_CONCURRENCY_PER_HOST: usize = 2;

/// Global rate limiting configuration that applies as defaults to all hosts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default minimum interval between requests to the same host
    #[serde(default = "default_request_interval", with = "humantime_serde")]
    pub request_interval: Duration,

    /// Default maximum concurrent requests per host
    #[serde(default = "default_concurrency_per_host")]
    pub max_concurrency_per_host: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            request_interval: default_request_interval(),
            max_concurrency_per_host: default_concurrency_per_host(),
        }
    }
}

const fn default_request_interval() -> Duration {
    DEFAULT_REQUEST_INTERVAL
}

const fn default_concurrency_per_host() -> usize {
    DEFAULT_CONCURRENCY_PER_HOST
}

/// Configuration override for hosts matching a pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Minimum interval between requests to matching hosts
    #[serde(default, with = "humantime_serde")]
    pub request_interval: Option<Duration>,

    /// Maximum concurrent requests allowed to matching hosts
    pub max_concurrency: Option<usize>,
}

impl HostConfig {
    /// Get the effective request interval, falling back to the global default
    #[must_use]
    pub fn effective_request_interval(&self, global: &RateLimitConfig) -> Duration {
        self.request_interval.unwrap_or(global.request_interval)
    }

    /// Get the effective maximum concurrency, falling back to the global default
    #[must_use]
    pub fn effective_max_concurrency(&self, global: &RateLimitConfig) -> usize {
        self.max_concurrency
            .unwrap_or(global.max_concurrency_per_host)
            .max(1)
    }
}

/// Per-host configuration overrides, keyed by host pattern.
///
/// A pattern is matched against a [`HostKey`] in precedence order:
///
/// 1. the full authority, e.g. `https://api.github.com:443`
/// 2. the exact hostname, e.g. `api.github.com`
/// 3. a `*.suffix` wildcard matching any subdomain, e.g. `*.github.com`
///
/// Unmatched hosts fall back to the global [`RateLimitConfig`] defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostConfigs(HashMap<String, HostConfig>);

impl HostConfigs {
    /// Look up the override for the given host, if any pattern matches
    #[must_use]
    pub fn lookup(&self, key: &HostKey) -> Option<&HostConfig> {
        if let Some(config) = self.0.get(key.as_str()) {
            return Some(config);
        }
        if let Some(config) = self.0.get(key.host()) {
            return Some(config);
        }
        // `*.example.com` matches `www.example.com` but not `example.com`
        // itself, mirroring how such wildcards behave in certificates.
        let mut rest = key.host();
        while let Some((_, suffix)) = rest.split_once('.') {
            if let Some(config) = self.0.get(&format!("*.{suffix}")) {
                return Some(config);
            }
            rest = suffix;
        }
        None
    }

    /// The effective request interval for the given host
    #[must_use]
    pub fn interval(&self, key: &HostKey, global: &RateLimitConfig) -> Duration {
        self.lookup(key)
            .map_or(global.request_interval, |config| {
                config.effective_request_interval(global)
            })
    }

    /// The effective per-host concurrency cap for the given host
    #[must_use]
    pub fn max_concurrency(&self, key: &HostKey, global: &RateLimitConfig) -> usize {
        self.lookup(key)
            .map_or(global.max_concurrency_per_host.max(1), |config| {
                config.effective_max_concurrency(global)
            })
    }
}

impl From<HashMap<String, HostConfig>> for HostConfigs {
    fn from(value: HashMap<String, HostConfig>) -> Self {
        Self(value)
    }
}

impl FromIterator<(String, HostConfig)> for HostConfigs {
    fn from_iter<T: IntoIterator<Item = (String, HostConfig)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn key(url: &str) -> HostKey {
        HostKey::try_from(&Url::parse(url).unwrap()).unwrap()
    }

    fn interval_override(ms: u64) -> HostConfig {
        HostConfig {
            request_interval: Some(Duration::from_millis(ms)),
            max_concurrency: None,
        }
    }

    #[test]
    fn test_effective_values_fall_back_to_global() {
        let global = RateLimitConfig::default();
        let config = HostConfig::default();
        assert_eq!(
            config.effective_request_interval(&global),
            global.request_interval
        );
        assert_eq!(
            config.effective_max_concurrency(&global),
            global.max_concurrency_per_host
        );
    }

    #[test]
    fn test_lookup_exact_hostname() {
        let configs: HostConfigs = [("example.com".to_string(), interval_override(250))]
            .into_iter()
            .collect();
        assert!(configs.lookup(&key("https://example.com/")).is_some());
        assert!(configs.lookup(&key("https://other.com/")).is_none());
    }

    #[test]
    fn test_lookup_authority_beats_hostname() {
        let configs: HostConfigs = [
            ("example.com".to_string(), interval_override(250)),
            (
                "https://example.com:443".to_string(),
                interval_override(100),
            ),
        ]
        .into_iter()
        .collect();
        let config = configs.lookup(&key("https://example.com/")).unwrap();
        assert_eq!(config.request_interval, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_lookup_wildcard() {
        let configs: HostConfigs = [("*.example.com".to_string(), interval_override(50))]
            .into_iter()
            .collect();
        assert!(configs.lookup(&key("https://api.example.com/")).is_some());
        assert!(
            configs
                .lookup(&key("https://deep.api.example.com/"))
                .is_some()
        );
        // the apex itself does not match the wildcard
        assert!(configs.lookup(&key("https://example.com/")).is_none());
    }

    #[test]
    fn test_interval_resolution() {
        let global = RateLimitConfig {
            request_interval: Duration::from_secs(1),
            max_concurrency_per_host: 2,
        };
        let configs: HostConfigs = [("slow.example.com".to_string(), interval_override(5000))]
            .into_iter()
            .collect();
        assert_eq!(
            configs.interval(&key("https://slow.example.com/"), &global),
            Duration::from_millis(5000)
        );
        assert_eq!(
            configs.interval(&key("https://fast.example.com/"), &global),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_concurrency_never_zero() {
        let global = RateLimitConfig {
            request_interval: Duration::from_secs(1),
            max_concurrency_per_host: 2,
        };
        let configs: HostConfigs = [(
            "example.com".to_string(),
            HostConfig {
                request_interval: None,
                max_concurrency: Some(0),
            },
        )]
        .into_iter()
        .collect();
        assert_eq!(configs.max_concurrency(&key("https://example.com/"), &global), 1);
    }
}
