//! # In-Memory Cache Store
//!
//! Response cache with per-entry TTL, tag-based group invalidation, an
//! optional entry cap, and a background sweeper for expired entries.
//!
//! Expired entries are logically absent: `get` checks the TTL on every read
//! and deletes a stale entry instead of returning it. The sweeper only bounds
//! memory for keys that are never read again.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used when a request does not set `cache_ttl`
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Interval of the expired-entry sweep; `None` disables the task
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,

    /// Maximum number of entries; the oldest entry is evicted when full
    pub max_entries: Option<usize>,

    /// Keys longer than this have their body component hashed
    pub max_key_length: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(300_000), // 5 minutes
            sweep_interval: Some(Duration::from_secs(60)),
            max_entries: None,
            max_key_length: 250,
        }
    }
}

/// Cache entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub stored_at: Instant,
    pub ttl: Duration,
    pub tags: HashSet<String>,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, ttl: Duration, tags: HashSet<String>) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
            tags,
        }
    }

    /// An entry is valid while `now - stored_at < ttl`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// Snapshot of cache contents and counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently stored, valid or not
    pub total: usize,

    /// Entries still within their TTL
    pub valid: usize,

    /// Entries past their TTL that have not been evicted yet
    pub expired: usize,

    pub hits: u64,
    pub misses: u64,

    /// Entries removed to respect `max_entries`
    pub evictions: u64,
}

/// Local, per-process response cache
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: config.max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a value, evicting it if its TTL has elapsed
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // re-checked under the shard lock in case a fresh value was just stored
            self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
            debug!(key = key, "Evicted expired cache entry on read");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value with a TTL and a set of invalidation tags
    pub fn set<I, S>(&self, key: &str, value: serde_json::Value, ttl: Duration, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.entries.contains_key(key) {
            self.evict_if_needed();
        }

        let entry = CacheEntry::new(value, ttl, tags.into_iter().map(Into::into).collect());
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove every entry carrying `tag`; returns how many were removed
    pub fn clear_by_tag(&self, tag: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.tags.contains(tag));
        let removed = before.saturating_sub(self.entries.len());
        debug!(tag = tag, removed = removed, "Invalidated cache entries by tag");
        removed
    }

    /// Remove every entry whose TTL has elapsed; returns how many were removed
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!("Cleared {} entries from response cache", count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let total = self.entries.len();
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .count();

        CacheStats {
            total,
            valid: total.saturating_sub(expired),
            expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Make room for one more entry when a cap is configured
    fn evict_if_needed(&self) {
        let Some(max_entries) = self.max_entries else {
            return;
        };
        if self.entries.len() < max_entries {
            return;
        }

        if self.clear_expired() > 0 && self.entries.len() < max_entries {
            return;
        }

        while self.entries.len() >= max_entries.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.stored_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Evicted oldest cache entry");
                }
                None => break,
            }
        }
    }
}

/// Background task that periodically drops expired entries
pub struct CacheSweeper {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl CacheSweeper {
    /// Start sweeping `store` every `interval`. Must be called inside a tokio runtime.
    pub fn start(store: Arc<CacheStore>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.clear_expired();
                        if removed > 0 {
                            debug!("Swept {} expired cache entries", removed);
                        }
                    }
                }
            }
            debug!("Cache sweeper stopped");
        });

        Self { cancel, handle }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
