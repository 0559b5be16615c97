//! Resolved-URL cache.
//!
//! Thread-safe map from video id to manifest URL with TTL-based eviction,
//! debounced persistence and deduplication of concurrent resolutions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Notify, OnceCell};
use tracing::debug;

use super::persist::SnapshotWriter;
use super::snapshot::{CacheEntry, load_snapshot};
use crate::Result;

/// Default TTL for resolved URLs (48 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Default quiet window before a snapshot is written.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(4000);

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Snapshot file. `None` keeps the cache in memory only.
    pub path: Option<PathBuf>,
    pub ttl: Duration,
    pub debounce: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("cache.json")),
            ttl: DEFAULT_TTL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Outcome shared with every caller waiting on the same resolution: the URL
/// and the name of the source that produced it, or the error text.
pub(crate) type InFlightResult = std::result::Result<(String, &'static str), String>;

pub(crate) struct InFlightState {
    result: OnceCell<InFlightResult>,
    notify: Notify,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: InFlightResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> InFlightResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

pub(crate) type InFlightRequest = Arc<InFlightState>;

/// Video id → manifest URL cache.
pub struct VodCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    in_flight: DashMap<String, InFlightRequest>,
    ttl: Duration,
    writer: Option<SnapshotWriter>,
}

impl VodCache {
    /// Cache without a snapshot file.
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: DashMap::new(),
            ttl,
            writer: None,
        }
    }

    /// Build the cache, restoring live entries from the snapshot when one is
    /// configured. Never fails on a missing or corrupt snapshot.
    pub async fn load(config: &CacheConfig) -> Self {
        let Some(path) = config.path.clone() else {
            return Self::in_memory(config.ttl);
        };

        let entries: DashMap<String, CacheEntry> = load_snapshot(&path).await.into_iter().collect();
        let entries = Arc::new(entries);
        let writer = SnapshotWriter::spawn(path, entries.clone(), config.debounce);

        Self {
            entries,
            in_flight: DashMap::new(),
            ttl: config.ttl,
            writer: Some(writer),
        }
    }

    /// Get the URL for a video id.
    ///
    /// Returns None if not cached or expired. Expired entries are evicted.
    pub fn get(&self, id: &str) -> Option<String> {
        let entry = self.entries.get(id)?;

        if entry.is_expired() {
            drop(entry);
            if self.entries.remove_if(id, |_, e| e.is_expired()).is_some() {
                self.persist();
            }
            return None;
        }

        Some(entry.url.clone())
    }

    /// Store a URL with the configured TTL.
    pub fn put(&self, id: impl Into<String>, url: impl Into<String>) {
        self.put_with_ttl(id, url, self.ttl);
    }

    /// Store a URL with an explicit TTL, replacing any previous entry.
    pub fn put_with_ttl(&self, id: impl Into<String>, url: impl Into<String>, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        self.entries.insert(id.into(), CacheEntry::new(url, expires_at));
        self.persist();
    }

    /// Schedule a debounced snapshot write. No-op for in-memory caches.
    pub fn persist(&self) {
        if let Some(writer) = &self.writer {
            writer.schedule();
        }
    }

    /// Write a snapshot immediately. Used on shutdown.
    pub async fn flush(&self) -> Result<()> {
        if let Some(writer) = &self.writer {
            let written = writer.flush().await?;
            debug!(path = %writer.path().display(), entries = written, "Flushed cache snapshot");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries from the cache.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.len();
        let now = Utc::now();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before.saturating_sub(self.len());
        if removed > 0 {
            self.persist();
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            in_flight_count: self.in_flight.len(),
            ttl: self.ttl,
            snapshot_writes: self.writer.as_ref().map_or(0, SnapshotWriter::write_count),
        }
    }

    // ========== Request Deduplication ==========

    /// Get or create the in-flight resolution for a video id.
    ///
    /// Returns the shared request and whether the caller created it (and so
    /// owns resolving it).
    pub(crate) fn get_or_create_in_flight(&self, id: &str) -> (InFlightRequest, bool) {
        if let Some(existing) = self.in_flight.get(id) {
            return (existing.clone(), false);
        }

        match self.in_flight.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let request = Arc::new(InFlightState::new());
                entry.insert(request.clone());
                (request, true)
            }
        }
    }

    /// Cache the URL and wake every waiter with it.
    pub(crate) fn complete_in_flight(
        &self,
        id: &str,
        request: &InFlightRequest,
        url: String,
        source: &'static str,
    ) {
        self.put(id, url.clone());
        self.release_in_flight(id, request, Ok((url, source)));
    }

    /// Wake every waiter with an error message. Nothing is cached.
    pub(crate) fn fail_in_flight(&self, id: &str, request: &InFlightRequest, reason: String) {
        self.release_in_flight(id, request, Err(reason));
    }

    /// Drop the in-flight entry and wake every waiter with `result` without
    /// touching the cached entries.
    pub(crate) fn release_in_flight(
        &self,
        id: &str,
        request: &InFlightRequest,
        result: InFlightResult,
    ) {
        self.remove_in_flight(id, request);
        request.set_result(result);
    }

    fn remove_in_flight(&self, id: &str, request: &InFlightRequest) {
        self.in_flight
            .remove_if(id, |_, current| Arc::ptr_eq(current, request));
    }

    pub(crate) async fn wait_for_in_flight(&self, request: &InFlightRequest) -> InFlightResult {
        request.wait().await
    }

    pub fn has_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    #[cfg(test)]
    pub(crate) fn insert_entry(&self, id: &str, entry: CacheEntry) {
        self.entries.insert(id.to_string(), entry);
    }
}

/// Statistics about the cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub in_flight_count: usize,
    pub ttl: Duration,
    pub snapshot_writes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir, debounce: Duration) -> CacheConfig {
        CacheConfig {
            path: Some(dir.path().join("cache.json")),
            ttl: DEFAULT_TTL,
            debounce,
        }
    }

    #[test]
    fn put_then_get() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        cache.put("123", "https://cdn.example.com/123.m3u8");

        assert_eq!(cache.get("123").as_deref(), Some("https://cdn.example.com/123.m3u8"));
        assert_eq!(cache.get("456"), None);
    }

    #[test]
    fn put_overwrites_previous_url() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        cache.put("1", "https://cdn.example.com/old.m3u8");
        cache.put("1", "https://cdn.example.com/new.m3u8");

        assert_eq!(cache.get("1").as_deref(), Some("https://cdn.example.com/new.m3u8"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        cache.insert_entry(
            "1",
            CacheEntry::new("https://cdn.example.com/1.m3u8", Utc::now() - chrono::Duration::seconds(1)),
        );

        assert_eq!(cache.get("1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        cache.put_with_ttl("1", "https://cdn.example.com/1.m3u8", Duration::ZERO);

        assert_eq!(cache.get("1"), None);
    }

    #[test]
    fn cleanup_expired_counts_removed() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        cache.put("live", "https://cdn.example.com/live.m3u8");
        cache.insert_entry(
            "dead",
            CacheEntry::new("https://cdn.example.com/dead.m3u8", Utc::now() - chrono::Duration::hours(1)),
        );

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn in_flight_is_shared_and_completed() {
        let cache = Arc::new(VodCache::in_memory(DEFAULT_TTL));

        let (owner, is_new) = cache.get_or_create_in_flight("42");
        assert!(is_new);
        let (joined, is_new) = cache.get_or_create_in_flight("42");
        assert!(!is_new);
        assert!(Arc::ptr_eq(&owner, &joined));

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.wait_for_in_flight(&joined).await })
        };

        cache.complete_in_flight(
            "42",
            &owner,
            "https://cdn.example.com/42.m3u8".to_string(),
            "recovery",
        );

        let (url, source) = waiter.await.unwrap().unwrap();
        assert_eq!(url, "https://cdn.example.com/42.m3u8");
        assert_eq!(source, "recovery");
        assert!(!cache.has_in_flight("42"));
        assert_eq!(cache.get("42").as_deref(), Some("https://cdn.example.com/42.m3u8"));
    }

    #[tokio::test]
    async fn failed_in_flight_caches_nothing() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        let (owner, _) = cache.get_or_create_in_flight("42");

        cache.fail_in_flight("42", &owner, "boom".to_string());

        assert_eq!(cache.wait_for_in_flight(&owner).await, Err("boom".to_string()));
        assert_eq!(cache.in_flight_count(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn expired_read_schedules_one_write_and_misses_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VodCache::load(&config_in(&dir, Duration::from_millis(50))).await;
        cache.insert_entry(
            "1",
            CacheEntry::new("https://cdn.example.com/1.m3u8", Utc::now() - chrono::Duration::seconds(1)),
        );

        assert_eq!(cache.get("1"), None);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.stats().snapshot_writes, 1);

        assert_eq!(cache.get("1"), None);
        assert_eq!(cache.get("2"), None);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.stats().snapshot_writes, 1);
    }

    #[tokio::test]
    async fn load_restores_flushed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, Duration::from_secs(60));

        let cache = VodCache::load(&config).await;
        cache.put("100", "https://cdn.example.com/100.m3u8");
        cache.flush().await.unwrap();
        drop(cache);

        let restored = VodCache::load(&config).await;
        assert_eq!(
            restored.get("100").as_deref(),
            Some("https://cdn.example.com/100.m3u8")
        );
    }

    #[tokio::test]
    async fn rapid_puts_produce_one_snapshot_write() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VodCache::load(&config_in(&dir, Duration::from_millis(100))).await;

        for i in 0..10 {
            cache.put(i.to_string(), format!("https://cdn.example.com/{i}.m3u8"));
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(cache.stats().snapshot_writes, 1);
    }

    #[tokio::test]
    async fn in_memory_flush_is_noop() {
        let cache = VodCache::in_memory(DEFAULT_TTL);
        cache.put("1", "https://cdn.example.com/1.m3u8");
        cache.flush().await.unwrap();
        assert_eq!(cache.stats().snapshot_writes, 0);
    }
}
