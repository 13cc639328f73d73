//! Bounded cache of decoded base images.
//!
//! Decoding is the one stage every variation of a request shares, and the same
//! base image is often submitted again with new palettes. The cache keeps the
//! decoded `PixelBuffer` behind an `Arc` so a hit hands the orchestrator the same
//! read-only buffer with no copy.

use std::sync::Arc;

use moka::sync::Cache;

use crate::core_modules::codec;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::Result;

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: u64,
    pub capacity: u64,
}

/// LRU-bounded map from a caller-chosen key to a decoded image.
#[derive(Debug, Clone)]
pub struct ImageCache {
    inner: Cache<String, Arc<PixelBuffer>>,
    capacity: u64,
}

impl ImageCache {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<PixelBuffer>> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: impl Into<String>, buffer: Arc<PixelBuffer>) {
        self.inner.insert(key.into(), buffer);
    }

    /// Returns the cached buffer for `key`, decoding `bytes` on a miss.
    ///
    /// Decode failures are returned and nothing is cached.
    pub fn get_or_decode(&self, key: &str, bytes: &[u8]) -> Result<Arc<PixelBuffer>> {
        if let Some(hit) = self.inner.get(key) {
            tracing::debug!(key, "image cache hit");
            return Ok(hit);
        }
        let decoded = Arc::new(codec::decode(bytes)?);
        self.inner.insert(key.to_string(), Arc::clone(&decoded));
        tracing::debug!(key, "image cache miss, decoded and stored");
        Ok(decoded)
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Entry count after flushing moka's pending maintenance.
    pub fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks();
        CacheStats {
            entry_count: self.inner.entry_count(),
            capacity: self.capacity,
        }
    }
}
