use crate::errors::CacheError;
use crate::models::{CacheEntry, RequestKey, ResponseParts};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(test)]
mod tests;

/// One named, versioned store of request/response pairs.
#[derive(Debug, Default)]
pub struct CacheArea {
    pub name: String,
    entries: HashMap<String, CacheEntry>,
}

impl CacheArea {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bytes_used(&self) -> usize {
        self.entries.values().map(CacheEntry::size).sum()
    }
}

/// All cache areas. Cloning shares the same storage.
///
/// Every method takes the lock once, so each call is atomic on its own but
/// nothing spans calls. Concurrent writers to one key race and the last
/// write wins.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    areas: Arc<RwLock<HashMap<String, CacheArea>>>,
    quota_bytes: Option<usize>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: Option<usize>) -> Self {
        Self {
            areas: Arc::default(),
            quota_bytes,
        }
    }

    /// Creates the area if it does not exist yet.
    pub async fn open(&self, name: &str) {
        let mut areas = self.areas.write().await;
        areas
            .entry(name.to_string())
            .or_insert_with(|| CacheArea::new(name));
    }

    pub async fn has(&self, name: &str) -> bool {
        self.areas.read().await.contains_key(name)
    }

    pub async fn delete(&self, name: &str) -> bool {
        self.areas.write().await.remove(name).is_some()
    }

    /// Names of every existing area.
    pub async fn keys(&self) -> Vec<String> {
        self.areas.read().await.keys().cloned().collect()
    }

    /// Request URLs stored in an area.
    pub async fn entry_keys(&self, area: &str) -> Vec<String> {
        self.areas
            .read()
            .await
            .get(area)
            .map(|a| a.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn entry_count(&self, area: &str) -> usize {
        self.areas.read().await.get(area).map_or(0, CacheArea::len)
    }

    pub async fn match_entry(&self, area: &str, key: &RequestKey) -> Option<CacheEntry> {
        let areas = self.areas.read().await;
        areas.get(area)?.entries.get(key.as_str()).cloned()
    }

    /// Stores a complete response with its fetch timestamp, opening the
    /// area if needed. Fails without writing when the area quota would be
    /// exceeded.
    pub async fn put(
        &self,
        area: &str,
        key: &RequestKey,
        response_parts: ResponseParts,
        fetched_at: u64,
    ) -> Result<(), CacheError> {
        let mut areas = self.areas.write().await;
        let cache_area = areas
            .entry(area.to_string())
            .or_insert_with(|| CacheArea::new(area));

        let entry = CacheEntry {
            response_parts,
            fetched_at,
        };

        if let Some(quota) = self.quota_bytes {
            let replaced = cache_area.entries.get(key.as_str()).map_or(0, CacheEntry::size);
            let projected = cache_area.bytes_used() - replaced + entry.size();
            if projected > quota {
                return Err(CacheError::CacheStorageFailure(format!(
                    "quota exceeded for {}: {} > {} bytes",
                    area, projected, quota
                )));
            }
        }

        cache_area.entries.insert(key.as_str().to_string(), entry);
        Ok(())
    }

    pub(crate) async fn update_entry<F>(&self, area: &str, key: &RequestKey, f: F) -> bool
    where
        F: FnOnce(&mut CacheEntry),
    {
        let mut areas = self.areas.write().await;
        match areas.get_mut(area).and_then(|a| a.entries.get_mut(key.as_str())) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }
}
