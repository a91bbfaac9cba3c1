//! In-memory audio cache with dual entry/byte budgets
//!
//! Entries are kept in recency order; when either budget would be exceeded
//! the least recently used entries are evicted until both are satisfied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;

use super::audio::{AudioClip, AudioMetadata};
use crate::clock::Clock;
use crate::config::CacheConfig;

/// A stored synthesis result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub audio: AudioClip,
    pub metadata: AudioMetadata,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub hit_count: u64,
}

/// Audio and metadata returned on a cache hit
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub audio: AudioClip,
    pub metadata: AudioMetadata,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Hits over lookups, 0.0 before the first lookup
    pub hit_rate: f64,
}

/// LRU audio cache bounded by entry count and total payload size
pub struct AudioCache {
    entries: LruCache<String, CacheEntry>,
    total_bytes: u64,
    max_entries: usize,
    max_bytes: u64,
    hits: u64,
    misses: u64,
    clock: Arc<dyn Clock>,
}

impl AudioCache {
    /// Create an empty cache with the given budgets, stamping entries with
    /// `clock`
    #[must_use]
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            max_entries: config.max_entries,
            max_bytes: config.max_bytes,
            hits: 0,
            misses: 0,
            clock,
        }
    }

    /// Look up a key, refreshing its recency on a hit
    pub fn lookup(&mut self, key: &str) -> Option<CachedAudio> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_accessed = self.clock.now();
            entry.hit_count += 1;
            self.hits += 1;
            tracing::debug!(key, hits = entry.hit_count, "audio cache hit");
            Some(CachedAudio {
                audio: entry.audio.clone(),
                metadata: entry.metadata.clone(),
            })
        } else {
            self.misses += 1;
            None
        }
    }

    /// Store audio under `key`, evicting as needed
    ///
    /// Returns `false` without storing when the payload alone exceeds the
    /// byte budget or the entry budget is zero.
    pub fn store(&mut self, key: &str, audio: AudioClip, metadata: AudioMetadata) -> bool {
        let size = audio.len() as u64;
        if size > self.max_bytes || self.max_entries == 0 {
            tracing::warn!(
                key,
                bytes = size,
                max_bytes = self.max_bytes,
                "audio too large for cache, not storing"
            );
            return false;
        }

        // Replacing an entry releases its budget first
        if let Some(previous) = self.entries.pop(key) {
            self.total_bytes -= previous.size_bytes;
        }

        while self.entries.len() >= self.max_entries || self.total_bytes + size > self.max_bytes {
            let Some((evicted_key, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes -= evicted.size_bytes;
            tracing::debug!(
                key = %evicted_key,
                bytes = evicted.size_bytes,
                hits = evicted.hit_count,
                "evicted audio cache entry"
            );
        }

        let now = self.clock.now();
        self.entries.put(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                audio,
                metadata,
                size_bytes: size,
                created_at: now,
                last_accessed: now,
                hit_count: 0,
            },
        );
        self.total_bytes += size;

        tracing::debug!(
            key,
            bytes = size,
            entries = self.entries.len(),
            total_bytes = self.total_bytes,
            "stored audio cache entry"
        );
        true
    }

    /// Inspect an entry without touching its recency or counters
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.peek(key)
    }

    /// Drop every entry and reset the counters
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.total_bytes = 0;
        self.hits = 0;
        self.misses = 0;
        tracing::info!(entries = dropped, "audio cache cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            entries: self.entries.len(),
            total_bytes: self.total_bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            hits: self.hits,
            misses: self.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}

impl std::fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCache")
            .field("entries", &self.entries.len())
            .field("total_bytes", &self.total_bytes)
            .field("max_entries", &self.max_entries)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}
