//! In-process cache for derived event galleries.
//!
//! One entry per event number, refreshed whole on every successful store
//! fetch and dropped on every mutation. Entries past the TTL are only served
//! through [`ImageCache::get_stale`], the fallback path for an upstream 429.
//! Writes are idempotent full replacements, so concurrent refreshes of the
//! same key need no coordination beyond the lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::ordering::EventImage;

/// How long a fetched gallery stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CacheEntry {
    images: Vec<EventImage>,
    captured_at: Instant,
}

pub struct ImageCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached gallery if it is fresh and non-empty.
    ///
    /// An empty cached result is treated as possibly transient (a failed or
    /// raced fetch) and forces a re-fetch rather than pinning "no images".
    pub fn get(&self, event_no: &str) -> Option<Vec<EventImage>> {
        let entries = self.entries.read();
        let entry = entries.get(event_no)?;

        if entry.captured_at.elapsed() < self.ttl && !entry.images.is_empty() {
            Some(entry.images.clone())
        } else {
            None
        }
    }

    /// Returns the last known gallery regardless of age. Only used when the
    /// media store is rate limiting us.
    pub fn get_stale(&self, event_no: &str) -> Option<Vec<EventImage>> {
        self.entries
            .read()
            .get(event_no)
            .map(|entry| entry.images.clone())
    }

    pub fn set(&self, event_no: &str, images: Vec<EventImage>) {
        self.entries.write().insert(
            event_no.to_string(),
            CacheEntry {
                images,
                captured_at: Instant::now(),
            },
        );
    }

    /// Drops the entry for an event. Called after every successful upload,
    /// delete or reorder so the next read re-derives from the store.
    pub fn invalidate(&self, event_no: &str) {
        self.entries.write().remove(event_no);
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}
