//! On-disk snapshot of the resolved-URL cache.
//!
//! The file is one JSON object mapping video id to `{ "url", "expiresAt" }`,
//! `expiresAt` being epoch milliseconds.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::utils::fs;

/// A resolved manifest URL and the instant it stops being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    #[serde(rename = "expiresAt", with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Map a stored key onto the video-id key domain.
///
/// Older snapshots were keyed by the video page URL
/// (`https://twitch.tv/videos/12345`); those collapse onto `12345`.
pub fn canonical_key(key: &str) -> Option<String> {
    let key = key.trim();
    if is_video_id(key) {
        return Some(key.to_string());
    }

    let (_, tail) = key.rsplit_once("/videos/")?;
    let id = tail.split(['?', '#', '/']).next()?;
    is_video_id(id).then(|| id.to_string())
}

pub fn is_video_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Read a snapshot, dropping expired and unrecognized entries.
///
/// A missing or unreadable file yields an empty map; this never fails startup.
pub async fn load_snapshot(path: &Path) -> HashMap<String, CacheEntry> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No cache snapshot found, starting cold");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cache snapshot, starting cold");
            return HashMap::new();
        }
    };

    let stored: HashMap<String, CacheEntry> = match serde_json::from_str(&raw) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt cache snapshot, starting cold");
            return HashMap::new();
        }
    };

    let now = Utc::now();
    let total = stored.len();
    let mut entries = HashMap::with_capacity(total);
    for (key, entry) in stored {
        if entry.is_expired_at(now) {
            continue;
        }
        match canonical_key(&key) {
            Some(id) => {
                // Keep the longest-lived record if two keys collapse onto one id.
                match entries.get(&id) {
                    Some(CacheEntry { expires_at, .. }) if *expires_at >= entry.expires_at => {}
                    _ => {
                        entries.insert(id, entry);
                    }
                }
            }
            None => debug!(key = %key, "Skipping cache record with unrecognized key"),
        }
    }

    info!(
        path = %path.display(),
        loaded = entries.len(),
        skipped = total - entries.len(),
        "Loaded cache snapshot"
    );
    entries
}

/// Serialize every live entry and atomically replace the snapshot file.
///
/// Returns the number of records written.
pub async fn write_snapshot(path: &Path, entries: &DashMap<String, CacheEntry>) -> Result<usize> {
    let now = Utc::now();
    let live: BTreeMap<String, CacheEntry> = entries
        .iter()
        .filter(|e| !e.value().is_expired_at(now))
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect();

    let json = serde_json::to_vec(&live)?;
    fs::write_atomic(path, &json).await?;
    Ok(live.len())
}
