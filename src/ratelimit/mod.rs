//! Per-host rate limiting and concurrency control.
//!
//! This module enforces a minimum interval between requests to the same
//! host and caps how many requests may be in flight to a host at once.
//! Both exist to avoid parallelism that overloads scrape targets.
//!
//! # Architecture
//!
//! - [`HostKey`]: a normalized host authority, the unit of rate limiting
//! - [`Host`]: spacing state, concurrency semaphore, and stats for one host
//! - [`RateLimiter`]: the registry coordinating all hosts
//! - [`HostConfig`]/[`HostConfigs`]: per-host-pattern overrides
//! - [`HostStats`]: statistics tracking for each host

mod config;
mod host;
mod key;
mod limiter;

pub use config::{HostConfig, HostConfigs, RateLimitConfig};
pub use host::{Host, HostStats, InFlightGuard};
pub use key::HostKey;
pub use limiter::RateLimiter;
