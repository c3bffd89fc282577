//! Orchestration core: the fetch scheduler.
//!
//! The scheduler owns a bounded pool of worker tasks pulling jobs from a
//! shared queue. Each job walks the request through cache lookup, per-host
//! admission (spacing plus in-flight cap), dispatch, and retry.
//!
//! Retries re-enter the queue after their backoff delay instead of looping
//! inside a worker, so a backed-off request never blocks a worker and its
//! delay composes with rate limiting on re-admission.
//!
//! Queue termination needs no bookkeeping: every live job owns a clone of
//! the queue sender, so the channel closes exactly when the last job
//! reaches a terminal state and the workers drain out.

mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

pub use config::{DEFAULT_USER_AGENT, FetchConfig};

use crate::backoff::BackoffPolicy;
use crate::cache::{CacheEntry, ResponseCache};
use crate::fingerprint::Fingerprint;
use crate::ratelimit::{HostStats, RateLimiter};
use crate::retry::RetryExt;
use crate::types::{FailureKind, FetchRequest, FetchResult, FetchStatus, FetchedResponse};
use crate::{ErrorKind, Result};

/// Buffer size of the result channel; workers apply backpressure when the
/// consumer falls behind
const RESULT_BUFFER: usize = 64;

/// A scheduled unit of work: one request attempt.
///
/// The `requeue` sender is the job's ticket back into the queue after a
/// backoff delay; it is also what keeps the queue open while the job is
/// alive anywhere (queued, in a worker, or sleeping out a backoff).
#[derive(Debug)]
struct Job {
    request: FetchRequest,
    key: Fingerprint,
    attempt: u32,
    requeue: mpsc::UnboundedSender<Job>,
}

/// Orchestrates concurrent fetches against a bounded worker pool,
/// consulting the [`ResponseCache`] and [`RateLimiter`] and applying the
/// [`BackoffPolicy`] on transient failures.
///
/// Cloning is cheap; clones share the same cache, limiter, and
/// cancellation state.
#[derive(Debug, Clone)]
pub struct FetchScheduler {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: FetchConfig,
    limiter: RateLimiter,
    cache: ResponseCache,
    backoff: BackoffPolicy,
    client: reqwest::Client,
    cancel: watch::Sender<bool>,
}

impl FetchScheduler {
    /// Create a new scheduler from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the
    /// HTTP client cannot be configured.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;
        let cache = ResponseCache::new(&config.cache_dir)?;
        let limiter = RateLimiter::new(config.rate_limit, config.host_overrides.clone());
        let backoff = BackoffPolicy::new(
            config.base_backoff,
            config.max_backoff,
            config.max_attempts,
        );
        let (cancel, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                limiter,
                cache,
                backoff,
                client,
                cancel,
            }),
        })
    }

    /// Submit a sequence of requests and stream back one [`FetchResult`]
    /// per request, in completion order.
    ///
    /// The stream ends once every submitted request has reached a
    /// terminal state. Every request resolves exactly once, including
    /// after cancellation.
    pub fn run(&self, requests: impl IntoIterator<Item = FetchRequest>) -> ReceiverStream<FetchResult> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::channel(RESULT_BUFFER);

        for request in requests {
            let key = Fingerprint::of(&request);
            let job = Job {
                request,
                key,
                attempt: 1,
                requeue: job_tx.clone(),
            };
            // Cannot fail: we still hold job_tx
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        // Opportunistic cleanup of stale cache entries, off the fetch path
        let evictor = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let removed = evictor.cache.evict_expired().await;
            if removed > 0 {
                log::debug!("Evicted {removed} expired cache entries");
            }
        });

        let job_rx = Arc::new(Mutex::new(job_rx));
        for _ in 0..self.inner.config.max_concurrency_global.max(1) {
            let inner = Arc::clone(&self.inner);
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            tokio::spawn(async move {
                loop {
                    // The lock is released before the job is processed, so
                    // workers only serialize on queue pickup
                    let job = { job_rx.lock().await.recv().await };
                    match job {
                        Some(job) => inner.process(job, &result_tx).await,
                        None => break,
                    }
                }
            });
        }

        ReceiverStream::new(result_rx)
    }

    /// Fetch a single request to completion.
    pub async fn fetch(&self, request: FetchRequest) -> FetchResult {
        use tokio_stream::StreamExt;
        self.run(std::iter::once(request))
            .next()
            .await
            .expect("scheduler yields exactly one result per request")
    }

    /// Cancel the entire run. Queued requests resolve as `Cancelled`
    /// immediately; in-flight fetches get the configured grace period to
    /// finish, then resolve as `Cancelled` too.
    pub fn shutdown(&self) {
        let _ = self.inner.cancel.send(true);
    }

    /// Statistics for all hosts seen so far, keyed by authority.
    #[must_use]
    pub fn host_stats(&self) -> HashMap<String, HostStats> {
        self.inner.limiter.all_host_stats()
    }
}

impl Inner {
    /// Walk a job through the request state machine:
    /// cache check, host admission, dispatch, retry or terminal result.
    async fn process(&self, job: Job, results: &mpsc::Sender<FetchResult>) {
        let mut signal = self.cancel.subscribe();

        // Queued-but-undispatched requests are discarded on cancellation
        if *signal.borrow() {
            Self::emit(results, job.request.clone(), FetchStatus::Cancelled).await;
            return;
        }

        // Cache check happens once, on the first attempt
        if job.attempt == 1
            && let Some(entry) = self.cache.get(&job.key).await
        {
            log::debug!("Cache hit for {}", job.request);
            Self::emit(results, job.request.clone(), FetchStatus::Cached(entry)).await;
            return;
        }

        let host_key = match job.request.host_key() {
            Ok(host_key) => host_key,
            Err(e) => {
                let kind = FailureKind::InvalidRequest(e.to_string());
                Self::emit(
                    results,
                    job.request.clone(),
                    FetchStatus::Failed(kind, job.attempt),
                )
                .await;
                return;
            }
        };
        let host = self.limiter.get_or_create(&host_key);

        // Per-host in-flight slot
        let guard = tokio::select! {
            guard = host.acquire() => guard,
            () = cancelled(&mut signal) => {
                Self::emit(results, job.request.clone(), FetchStatus::Cancelled).await;
                return;
            }
        };

        // Per-host spacing; admit and record atomically so two workers
        // racing on the same host cannot both dispatch within one interval
        loop {
            match host.try_dispatch() {
                Ok(()) => break,
                Err(wait) => {
                    log::debug!(
                        "Host {} not ready, waiting {}ms",
                        host.key,
                        wait.as_millis()
                    );
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = cancelled(&mut signal) => {
                            Self::emit(results, job.request.clone(), FetchStatus::Cancelled).await;
                            return;
                        }
                    }
                }
            }
        }

        // Dispatch. On cancellation the fetch gets a grace period to
        // finish before it is abandoned with a hard deadline.
        let outcome = {
            let fetch = self.dispatch(&job.request);
            tokio::pin!(fetch);
            tokio::select! {
                outcome = &mut fetch => Some(outcome),
                () = cancelled(&mut signal) => {
                    (tokio::time::timeout(self.config.shutdown_grace, &mut fetch).await).ok()
                }
            }
        };
        // Release the in-flight slot before any backoff wait
        drop(guard);

        let Some(outcome) = outcome else {
            Self::emit(results, job.request.clone(), FetchStatus::Cancelled).await;
            return;
        };

        match outcome {
            Ok(response) => {
                host.record_success();
                let entry = CacheEntry::new(
                    job.key.clone(),
                    response.status_code,
                    &response.headers,
                    response.body.clone(),
                    self.config.cache_ttl,
                );
                self.cache.put(&entry).await;
                Self::emit(
                    results,
                    job.request.clone(),
                    FetchStatus::Fetched(response, job.attempt),
                )
                .await;
            }
            Err(kind) => {
                host.record_failure();
                match self.backoff.next_delay(job.attempt + 1, &kind) {
                    Some(delay) => {
                        log::debug!(
                            "Retrying {} in {}ms after {kind} (attempt {} of {})",
                            job.request,
                            delay.as_millis(),
                            job.attempt + 1,
                            self.backoff.max_attempts()
                        );
                        self.schedule_retry(job, delay, results);
                    }
                    None => {
                        Self::emit(
                            results,
                            job.request.clone(),
                            FetchStatus::Failed(kind, job.attempt),
                        )
                        .await;
                    }
                }
            }
        }
    }

    /// Execute a single fetch attempt and classify the outcome
    async fn dispatch(&self, request: &FetchRequest) -> std::result::Result<FetchedResponse, FailureKind> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FailureKind::Status(status.as_u16()));
        }

        let headers = response.headers().clone();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(FetchedResponse {
            status_code: status.as_u16(),
            headers,
            body,
            fetched_at: SystemTime::now(),
        })
    }

    /// Re-enter the queue with `attempt + 1` after the backoff delay.
    ///
    /// Runs on its own task so no worker sleeps out the delay. The job is
    /// re-admitted through rate limiting like any other queued request,
    /// and may be overtaken by later-submitted requests meanwhile.
    fn schedule_retry(&self, mut job: Job, delay: std::time::Duration, results: &mpsc::Sender<FetchResult>) {
        let results = results.clone();
        let mut signal = self.cancel.subscribe();
        job.attempt += 1;
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    let requeue = job.requeue.clone();
                    // Cannot fail: the job itself holds a queue sender
                    let _ = requeue.send(job);
                }
                () = cancelled(&mut signal) => {
                    Self::emit(&results, job.request.clone(), FetchStatus::Cancelled).await;
                }
            }
        });
    }

    async fn emit(results: &mpsc::Sender<FetchResult>, request: FetchRequest, status: FetchStatus) {
        // The receiver may be gone if the caller dropped the stream;
        // nothing left to report to in that case
        let _ = results.send(FetchResult::new(request, status)).await;
    }
}

/// Resolves once the run has been cancelled; pends forever otherwise
async fn cancelled(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender dropped without cancelling; never resolve
        std::future::pending::<()>().await;
    }
}

/// Map a `reqwest` error to the scheduler failure taxonomy
fn classify_reqwest_error(e: reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        return FailureKind::Timeout;
    }
    if let Some(status) = e.status() {
        return FailureKind::Status(status.as_u16());
    }
    FailureKind::Network {
        retryable: e.should_retry(),
        reason: e.to_string(),
    }
}
