//! Per-entry freshness bookkeeping.
//!
//! The timestamp of the last successful network write lives on the stored
//! `CacheEntry` itself, so it can never collide with a real request key and
//! disappears together with its area.

use crate::models::RequestKey;
use crate::store::CacheStorage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// `now - fetched_at < ttl`. Timestamps from the future count as fresh.
pub fn is_within_ttl(fetched_at: u64, ttl: Duration, now: u64) -> bool {
    (now.saturating_sub(fetched_at) as u128) < ttl.as_millis()
}

impl CacheStorage {
    /// Overwrites the fetch timestamp of an existing entry, used when the
    /// network confirms the cached body is current. New bodies are stamped
    /// by `CacheStorage::put`. Returns `false` when there is no entry to
    /// record against.
    pub async fn record_fetch(&self, area: &str, key: &RequestKey, timestamp: u64) -> bool {
        self.update_entry(area, key, |entry| entry.fetched_at = timestamp)
            .await
    }

    pub async fn is_fresh(&self, area: &str, key: &RequestKey, ttl: Duration, now: u64) -> bool {
        match self.match_entry(area, key).await {
            Some(entry) => is_within_ttl(entry.fetched_at, ttl, now),
            None => false,
        }
    }
}
