//! Expiring district cache.
//!
//! `CacheStore` owns TTL, max-age and eviction. Storage is delegated to a
//! `KeyValueStore` backend: a JSON file at ~/.civic_districts/district_cache.json
//! or an in-memory map. Backends mutate in memory only. A durable backend hands
//! back a [`FlushJob`] after each mutation, and the store writes it once the
//! backend lock is released. From async code the write runs on the blocking pool.

use super::types::DistrictMapping;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache size above which a write triggers an expired-entry sweep.
pub const DEFAULT_CLEANUP_THRESHOLD: usize = 1000;

/// One persisted cache record. Replaced wholesale on overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub zip_code: String,
    pub mapping: DistrictMapping,
    /// Expiry as Unix milliseconds.
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Milliseconds since the mapping was last resolved.
    fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.mapping.location().last_updated.timestamp_millis()
    }
}

// ─── Backends ───────────────────────────────────────────────────

/// A serialized backend image waiting to be written.
#[derive(Debug)]
pub struct FlushJob {
    path: PathBuf,
    contents: String,
    generation: u64,
    written: Arc<Mutex<u64>>,
}

impl FlushJob {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the image, unless a newer one from the same backend already landed.
    pub fn write(self) -> io::Result<()> {
        let mut written = self.written.lock();
        if self.generation <= *written {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, self.contents)?;
        *written = self.generation;
        Ok(())
    }
}

/// Key-value storage behind the cache.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn set(&mut self, key: &str, entry: CacheEntry);
    /// Returns whether the key existed.
    fn delete(&mut self, key: &str) -> bool;
    fn entries(&self) -> Vec<CacheEntry>;
    fn len(&self) -> usize;
    fn clear(&mut self);

    /// Image to persist after a mutation. Volatile backends return None.
    fn flush_job(&mut self) -> io::Result<Option<FlushJob>> {
        Ok(None)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys whose entries have expired as of `now_ms`.
    fn expired_keys(&self, now_ms: i64) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.is_expired(now_ms))
            .map(|e| e.zip_code)
            .collect()
    }

    /// Remove several keys, returning how many existed.
    fn delete_many(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.delete(key)).count()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn entries(&self) -> Vec<CacheEntry> {
        self.entries.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn expired_keys(&self, now_ms: i64) -> Vec<String> {
        expired_in(&self.entries, now_ms)
    }
}

fn expired_in(entries: &HashMap<String, CacheEntry>, now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .filter(|(_, e)| e.is_expired(now_ms))
        .map(|(k, _)| k.clone())
        .collect()
}

/// JSON map keyed by ZIP code. Every mutation produces a full-file flush job.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    generation: u64,
    written: Arc<Mutex<u64>>,
}

impl JsonFileStore {
    /// Load from the default location (~/.civic_districts/district_cache.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load from a specific path. A missing or unreadable file starts empty.
    pub fn load_from(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        debug!(path = %path.display(), entries = entries.len(), "loaded district cache");
        Self {
            path,
            entries,
            generation: 0,
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".civic_districts")
            .join("district_cache.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Option<HashMap<String, CacheEntry>> {
        let data = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable district cache");
                None
            }
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn entries(&self) -> Vec<CacheEntry> {
        self.entries.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn flush_job(&mut self) -> io::Result<Option<FlushJob>> {
        self.generation += 1;
        Ok(Some(FlushJob {
            path: self.path.clone(),
            contents: serde_json::to_string_pretty(&self.entries)?,
            generation: self.generation,
            written: Arc::clone(&self.written),
        }))
    }

    fn expired_keys(&self, now_ms: i64) -> Vec<String> {
        expired_in(&self.entries, now_ms)
    }
}

// ─── CacheStore ─────────────────────────────────────────────────

/// Counters since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

pub struct CacheStore {
    backend: Mutex<Box<dyn KeyValueStore>>,
    cleanup_threshold: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// File-backed store at `path`.
    pub fn open(path: PathBuf) -> Self {
        Self::new(JsonFileStore::load_from(path))
    }

    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    /// Fresh mapping for `key`, or None if absent, expired, or older than `max_age`.
    pub fn get(&self, key: &str, max_age: Option<Duration>) -> Option<DistrictMapping> {
        let now = Utc::now().timestamp_millis();
        let entry = self.backend.lock().get(key);

        let fresh = entry.filter(|e| {
            !e.is_expired(now)
                && max_age.map_or(true, |max| e.age_ms(now) <= duration_ms(max))
        });

        match fresh {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(zip = key, "district cache hit");
                Some(entry.mapping)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Mapping for `key` regardless of expiry, as long as it was resolved
    /// within `relaxed_max_age`.
    pub fn get_stale(&self, key: &str, relaxed_max_age: Duration) -> Option<DistrictMapping> {
        let now = Utc::now().timestamp_millis();
        self.backend
            .lock()
            .get(key)
            .filter(|e| e.age_ms(now) <= duration_ms(relaxed_max_age))
            .map(|e| e.mapping)
    }

    /// Store a mapping and write it through on the calling thread.
    pub fn set(&self, key: &str, mapping: DistrictMapping, ttl: Duration) {
        if let Some(job) = self.insert(key, mapping, ttl) {
            flush(job);
        }
    }

    /// Store a mapping; the write-through runs on the blocking pool.
    pub async fn store(&self, key: &str, mapping: DistrictMapping, ttl: Duration) {
        let Some(job) = self.insert(key, mapping, ttl) else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || flush(job)).await {
            warn!(zip = key, error = %e, "district cache flush task failed");
        }
    }

    /// Insert under the lock, sweeping expired entries once the store grows
    /// past the cleanup threshold.
    fn insert(&self, key: &str, mapping: DistrictMapping, ttl: Duration) -> Option<FlushJob> {
        let now = Utc::now().timestamp_millis();
        let entry = CacheEntry {
            zip_code: key.to_string(),
            mapping,
            expires_at: now.saturating_add(duration_ms(ttl)),
        };

        let job = {
            let mut backend = self.backend.lock();
            backend.set(key, entry);
            if backend.len() > self.cleanup_threshold {
                self.sweep(&mut **backend, now);
            }
            take_job(&mut **backend)
        };
        self.writes.fetch_add(1, Ordering::Relaxed);
        job
    }

    pub fn delete(&self, key: &str) -> bool {
        let (existed, job) = {
            let mut backend = self.backend.lock();
            let existed = backend.delete(key);
            (existed, if existed { take_job(&mut **backend) } else { None })
        };
        if let Some(job) = job {
            flush(job);
        }
        existed
    }

    pub fn clear(&self) {
        let job = {
            let mut backend = self.backend.lock();
            backend.clear();
            take_job(&mut **backend)
        };
        if let Some(job) = job {
            flush(job);
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now().timestamp_millis();
        let (removed, job) = {
            let mut backend = self.backend.lock();
            let removed = self.sweep(&mut **backend, now);
            (removed, if removed > 0 { take_job(&mut **backend) } else { None })
        };
        if let Some(job) = job {
            flush(job);
        }
        removed
    }

    fn sweep(&self, backend: &mut dyn KeyValueStore, now_ms: i64) -> usize {
        let expired = backend.expired_keys(now_ms);
        if expired.is_empty() {
            return 0;
        }
        let removed = backend.delete_many(&expired);
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(removed, remaining = backend.len(), "swept expired district cache entries");
        removed
    }

    pub fn len(&self) -> usize {
        self.backend.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

fn take_job(backend: &mut dyn KeyValueStore) -> Option<FlushJob> {
    backend.flush_job().unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize district cache");
        None
    })
}

/// Cache persistence is best-effort: failures are logged, never raised.
fn flush(job: FlushJob) {
    let path = job.path().to_path_buf();
    if let Err(e) = job.write() {
        warn!(path = %path.display(), error = %e, "failed to persist district cache");
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
