//! Fast-path token cache
//!
//! Only a validation accelerant: the registry row stays the source of truth
//! for `used`. A miss is treated as expiry, so eviction on consume makes a
//! token unusable immediately.

use cached::{Cached, TimedCache};
use parking_lot::Mutex;

pub trait TokenCache: Send + Sync {
    fn put(&self, code_hash: &str);
    fn contains(&self, code_hash: &str) -> bool;
    fn evict(&self, code_hash: &str);
}

/// Inserts between sweeps of expired entries
pub const FLUSH_EVERY: usize = 64;

struct Slots {
    cache: TimedCache<String, ()>,
    inserts: usize,
}

/// In-process cache with a fixed per-entry lifespan.
///
/// `TimedCache` only drops an expired key when it is read again, so codes
/// that are issued and never scanned are swept every [`FLUSH_EVERY`] inserts.
pub struct TimedTokenCache {
    inner: Mutex<Slots>,
}

impl TimedTokenCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(Slots {
                cache: TimedCache::with_lifespan(ttl_seconds),
                inserts: 0,
            }),
        }
    }

    /// Entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.lock().cache.cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenCache for TimedTokenCache {
    fn put(&self, code_hash: &str) {
        let mut slots = self.inner.lock();
        slots.cache.cache_set(code_hash.to_string(), ());
        slots.inserts += 1;
        if slots.inserts % FLUSH_EVERY == 0 {
            slots.cache.flush();
        }
    }

    fn contains(&self, code_hash: &str) -> bool {
        self.inner
            .lock()
            .cache
            .cache_get(&code_hash.to_string())
            .is_some()
    }

    fn evict(&self, code_hash: &str) {
        self.inner.lock().cache.cache_remove(&code_hash.to_string());
    }
}
