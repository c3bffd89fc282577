use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::config::{HostConfigs, RateLimitConfig};
use super::host::{Host, HostStats};
use super::key::HostKey;

/// Enforces minimum inter-request spacing per target host and manages the
/// registry of [`Host`] instances.
///
/// Hosts are created lazily on first request. All operations are total:
/// the limiter never fails, it only ever answers with a wait duration.
///
/// # Architecture
///
/// - Each unique authority gets its own [`Host`] with dedicated spacing
///   state and concurrency semaphore
/// - Thread-safe via `DashMap`; updates to one host's state are mutually
///   exclusive, different hosts never contend on a shared lock
#[derive(Debug)]
pub struct RateLimiter {
    /// Map of authority to `Host` instances, created on demand
    hosts: DashMap<HostKey, Arc<Host>>,

    /// Global spacing and concurrency defaults
    config: RateLimitConfig,

    /// Per-host-pattern overrides
    overrides: HostConfigs,
}

impl RateLimiter {
    /// Create a new `RateLimiter` with the given defaults and overrides
    #[must_use]
    pub fn new(config: RateLimitConfig, overrides: HostConfigs) -> Self {
        Self {
            hosts: DashMap::new(),
            config,
            overrides,
        }
    }

    /// The duration the caller must wait before the next dispatch to the
    /// given host. Zero means "dispatch now". Always succeeds.
    #[must_use]
    pub fn admit(&self, key: &HostKey) -> Duration {
        self.get_or_create(key).admit()
    }

    /// Record an actual dispatch to the given host, pushing its
    /// `next_allowed_at` forward by the host's interval
    pub fn record_dispatch(&self, key: &HostKey) {
        self.get_or_create(key).record_dispatch();
    }

    /// The effective spacing interval for the given host
    #[must_use]
    pub fn interval(&self, key: &HostKey) -> Duration {
        self.overrides.interval(key, &self.config)
    }

    /// Get an existing host or create a new one for the given authority
    pub fn get_or_create(&self, key: &HostKey) -> Arc<Host> {
        if let Some(host) = self.hosts.get(key) {
            return host.clone();
        }

        let interval = self.overrides.interval(key, &self.config);
        let max_concurrent = self.overrides.max_concurrency(key, &self.config);

        // Handle the race where another task created the host in between
        match self.hosts.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                log::debug!(
                    "Creating host {key} (interval {}ms, {max_concurrent} concurrent)",
                    interval.as_millis()
                );
                entry
                    .insert(Arc::new(Host::new(key.clone(), interval, max_concurrent)))
                    .clone()
            }
        }
    }

    /// Get statistics for a specific host.
    ///
    /// Returns empty stats for a host that never received a request,
    /// which keeps the behavior consistent whether or not the host exists.
    #[must_use]
    pub fn host_stats(&self, key: &HostKey) -> HostStats {
        self.hosts
            .get(key)
            .map(|host| host.stats())
            .unwrap_or_default()
    }

    /// Get statistics for all hosts that have been created, keyed by
    /// authority
    #[must_use]
    pub fn all_host_stats(&self) -> HashMap<String, HostStats> {
        self.hosts
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect()
    }

    /// Number of distinct hosts seen so far
    #[must_use]
    pub fn active_host_count(&self) -> usize {
        self.hosts.len()
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::ratelimit::HostConfig;

    fn key(url: &str) -> HostKey {
        HostKey::try_from(&Url::parse(url).unwrap()).unwrap()
    }

    fn limiter_with_interval(ms: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                request_interval: Duration::from_millis(ms),
                max_concurrency_per_host: 2,
            },
            HostConfigs::default(),
        )
    }

    #[test]
    fn test_admit_is_zero_for_new_host() {
        let limiter = limiter_with_interval(100);
        assert_eq!(limiter.admit(&key("https://example.com/")), Duration::ZERO);
        assert_eq!(limiter.active_host_count(), 1);
    }

    #[test]
    fn test_admit_after_record_dispatch() {
        let limiter = limiter_with_interval(100);
        let host = key("https://example.com/");
        limiter.record_dispatch(&host);
        let wait = limiter.admit(&host);
        // wait is interval minus elapsed time, never negative
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(100));
    }

    #[test]
    fn test_hosts_are_independent() {
        let limiter = limiter_with_interval(100);
        limiter.record_dispatch(&key("https://one.example.com/"));
        assert_eq!(
            limiter.admit(&key("https://two.example.com/")),
            Duration::ZERO
        );
        assert_eq!(limiter.active_host_count(), 2);
    }

    #[test]
    fn test_host_reuse() {
        let limiter = limiter_with_interval(100);
        let first = limiter.get_or_create(&key("https://example.com/a"));
        let second = limiter.get_or_create(&key("https://example.com/b"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(limiter.active_host_count(), 1);
    }

    #[test]
    fn test_override_applies_to_matching_host() {
        let overrides: HostConfigs = [(
            "slow.example.com".to_string(),
            HostConfig {
                request_interval: Some(Duration::from_secs(5)),
                max_concurrency: Some(1),
            },
        )]
        .into_iter()
        .collect();
        let limiter = RateLimiter::new(RateLimitConfig::default(), overrides);

        assert_eq!(
            limiter.interval(&key("https://slow.example.com/")),
            Duration::from_secs(5)
        );
        let host = limiter.get_or_create(&key("https://slow.example.com/"));
        assert_eq!(host.available_permits(), 1);
    }

    #[test]
    fn test_stats_for_unknown_host_are_empty() {
        let limiter = limiter_with_interval(100);
        let stats = limiter.host_stats(&key("https://nowhere.example.com/"));
        assert_eq!(stats.total_dispatched, 0);
        assert_eq!(limiter.active_host_count(), 0);
    }
}
