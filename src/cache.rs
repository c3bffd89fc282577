//! Content-addressed on-disk response cache.
//!
//! Each entry lives in its own JSON file named after the request
//! [`Fingerprint`]. Writes go to a temp file first and are moved into
//! place with an atomic rename, so a concurrent [`ResponseCache::get`]
//! never observes a partially written entry.
//!
//! Caching is best-effort: storage failures on reads degrade to a cache
//! miss and failures on writes are logged and swallowed. The cache never
//! blocks the fetch path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::fingerprint::Fingerprint;
use crate::{ErrorKind, Result};

/// Temp files older than this are considered orphaned by a crashed
/// writer and get removed by [`ResponseCache::evict_expired`]. Live
/// writes only hold a temp name for the duration of one `put`.
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// A single cached response, immutable after write.
///
/// A refresh creates a new entry which overwrites the key; entries are
/// never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the normalized request this entry answers
    pub key: Fingerprint,
    /// HTTP status code of the cached response
    pub status_code: u16,
    /// Response headers as string pairs (kept simple on purpose, so the
    /// cache files can be inspected or edited by humans)
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: String,
    /// When the response was stored
    pub stored_at: SystemTime,
    /// How long the entry stays fresh after `stored_at`
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl CacheEntry {
    /// Create a new entry stored at the current time
    #[must_use]
    pub fn new(
        key: Fingerprint,
        status_code: u16,
        headers: &HeaderMap,
        body: String,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            status_code,
            headers: headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect(),
            body,
            stored_at: SystemTime::now(),
            ttl,
        }
    }

    /// Whether the entry is still fresh at the given point in time
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        self.stored_at
            .checked_add(self.ttl)
            .is_some_and(|expiry| expiry >= now)
    }

    /// Reconstruct the response headers from the stored string pairs.
    /// Pairs that no longer parse as valid headers are skipped.
    #[must_use]
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }
}

/// On-disk store mapping request fingerprints to cached responses
#[derive(Debug)]
pub struct ResponseCache {
    dir: PathBuf,
    /// Distinguishes temp files of concurrent writers to the same key
    next_temp_id: AtomicU64,
}

impl ResponseCache {
    /// Open (and create, if needed) a cache at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ErrorKind::from((dir.clone(), e)))?;
        Ok(Self {
            dir,
            next_temp_id: AtomicU64::new(0),
        })
    }

    /// Look up a fresh entry for the given fingerprint.
    ///
    /// Returns `None` for missing, expired, or unreadable entries.
    /// Storage errors are treated as a miss, never propagated.
    pub async fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cache read failed for {}: {e}", path.display());
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Discarding unparsable cache entry {}: {e}", path.display());
                return None;
            }
        };
        if !entry.is_fresh(SystemTime::now()) {
            // Expired entries are treated as absent; eviction happens
            // separately in evict_expired.
            log::debug!("Cache entry {key} expired");
            return None;
        }
        Some(entry)
    }

    /// Store an entry, overwriting any existing entry for its key.
    ///
    /// The write is atomic from a reader's perspective. Failures are
    /// logged and swallowed; caching never blocks the critical path.
    pub async fn put(&self, entry: &CacheEntry) {
        let path = self.entry_path(&entry.key);
        let temp = self.temp_path(&entry.key);
        let bytes = match serde_json::to_vec_pretty(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Failed to serialize cache entry {}: {e}", entry.key);
                return;
            }
        };
        if let Err(e) = fs::write(&temp, &bytes).await {
            log::warn!("Cache write failed for {}: {e}", temp.display());
            return;
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            log::warn!("Cache rename failed for {}: {e}", path.display());
            let _ = fs::remove_file(&temp).await;
        }
    }

    /// Scan the cache directory and remove entries past their TTL.
    ///
    /// Returns the number of removed entries. Safe to run concurrently
    /// with `get` and `put`: in-progress writes live under a temp name
    /// until their atomic rename. Temp files left behind by a crashed
    /// writer are removed once older than [`STALE_TEMP_AGE`]. Storage
    /// errors are swallowed.
    pub async fn evict_expired(&self) -> usize {
        let mut removed = 0;
        let now = SystemTime::now();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cache eviction scan failed: {e}");
                return 0;
            }
        };
        while let Ok(Some(dir_entry)) = entries.next_entry().await {
            let path = dir_entry.path();
            let extension = path.extension().and_then(|e| e.to_str());
            if extension == Some("tmp") {
                if let Ok(metadata) = dir_entry.metadata().await
                    && let Ok(modified) = metadata.modified()
                    && now
                        .duration_since(modified)
                        .is_ok_and(|age| age > STALE_TEMP_AGE)
                    && fs::remove_file(&path).await.is_ok()
                {
                    log::debug!("Removed orphaned temp file {}", path.display());
                }
                continue;
            }
            if extension != Some("json") {
                continue;
            }
            let Ok(bytes) = fs::read(&path).await else {
                continue;
            };
            let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                continue;
            };
            if !entry.is_fresh(now) && fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn temp_path(&self, key: &Fingerprint) -> PathBuf {
        let id = self.next_temp_id.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{key}.{id}.tmp"))
    }

    /// The directory backing this cache
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
