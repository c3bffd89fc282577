//! `politefetch` is a polite, resumable web-scraping fetch engine.
//!
//! It rate-limits requests per target host, retries transient failures
//! with jittered exponential backoff, caches responses on disk, and
//! bounds parallelism both globally and per host, so a scraping run never
//! overloads its targets and can be re-run cheaply.
//!
//! "Hello world" example:
//!
//! ```no_run
//! use politefetch::{FetchConfig, FetchRequest, FetchScheduler, Result};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scheduler = FetchScheduler::new(FetchConfig::default())?;
//!     let mut results = scheduler.run(vec![
//!         FetchRequest::try_from("https://example.com/a")?,
//!         FetchRequest::try_from("https://example.com/b")?,
//!     ]);
//!     while let Some(result) = results.next().await {
//!         println!("{result}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For finer control, tune [`FetchConfig`]: per-host request intervals
//! and concurrency caps (with per-host-pattern overrides), retry and
//! backoff limits, cache TTL and location, and the per-fetch deadline.

mod backoff;
mod cache;
mod fingerprint;
mod retry;
mod scheduler;
mod types;

pub mod ratelimit;

pub use backoff::BackoffPolicy;
pub use cache::{CacheEntry, ResponseCache};
pub use fingerprint::Fingerprint;
pub use scheduler::{DEFAULT_USER_AGENT, FetchConfig, FetchScheduler};
pub use types::*;
