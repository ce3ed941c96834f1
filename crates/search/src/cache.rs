//! TTL- and capacity-bounded response cache.
//!
//! Keys include the graph version, so an index rebuild invalidates every
//! stale entry by key without any explicit flush. Entries are immutable
//! once inserted and shared via `Arc`.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::types::SearchResponse;

/// Composite cache key of one search request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub query: String,
    pub k: usize,
    pub offset: usize,
    pub graph_version: u64,
    pub corpus_id: String,
}

struct CacheEntry {
    inserted_at: Instant,
    payload: Arc<SearchResponse>,
}

pub struct ResponseCache {
    entries: Mutex<LruCache<ResponseKey, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("non-zero cache size"),
            )),
            ttl,
        }
    }

    /// Fetch a live entry; expired entries are dropped on sight.
    pub fn get(&self, key: &ResponseKey) -> Option<Arc<SearchResponse>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.payload.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: ResponseKey, payload: Arc<SearchResponse>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CacheEntry {
                    inserted_at: Instant::now(),
                    payload,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
