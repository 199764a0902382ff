// Away-mode read cache

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Default time-to-live for a cached away state (seconds)
pub const DEFAULT_AWAY_CACHE_TTL: u64 = 120;

/// Cached away state of one home
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub mode: bool,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe cache of away states indexed by home id
pub struct AwayModeCache {
    entries: Arc<DashMap<String, CacheEntry>>,

    /// Cache TTL in seconds
    cache_ttl: u64,
}

impl AwayModeCache {
    /// Create a new away-mode cache
    pub fn new(cache_ttl: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            cache_ttl,
        }
    }

    /// Cached away state, if present and not expired
    pub fn get(&self, home_id: &str) -> Option<bool> {
        self.get_at(home_id, Utc::now())
    }

    fn get_at(&self, home_id: &str, now: DateTime<Utc>) -> Option<bool> {
        let entry = *self.entries.get(home_id)?;
        if entry.is_expired(now) {
            self.entries.remove_if(home_id, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry.mode)
    }

    /// Store an away state for the configured TTL
    pub fn set(&self, home_id: &str, mode: bool) {
        self.set_at(home_id, mode, Utc::now());
    }

    fn set_at(&self, home_id: &str, mode: bool, now: DateTime<Utc>) {
        let expires_at = now + Duration::seconds(self.cache_ttl as i64);
        self.entries
            .insert(home_id.to_string(), CacheEntry { mode, expires_at });
        tracing::debug!("Cached away mode `{}` for home {}", mode, home_id);
    }

    /// Drop the cached state of a home
    pub fn invalidate(&self, home_id: &str) {
        self.entries.remove(home_id);
    }

    /// Whether the cached state of a home is missing or expired
    pub fn is_stale(&self, home_id: &str) -> bool {
        self.get(home_id).is_none()
    }

    /// Raw entry including its expiry
    #[cfg(test)]
    pub(crate) fn entry(&self, home_id: &str) -> Option<CacheEntry> {
        self.entries.get(home_id).map(|e| *e.value())
    }

    /// Cache TTL in seconds
    #[cfg(test)]
    pub(crate) fn ttl(&self) -> u64 {
        self.cache_ttl
    }
}

impl Default for AwayModeCache {
    fn default() -> Self {
        Self::new(DEFAULT_AWAY_CACHE_TTL)
    }
}

impl Clone for AwayModeCache {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            cache_ttl: self.cache_ttl,
        }
    }
}
