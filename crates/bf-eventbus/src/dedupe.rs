//! A convenience for handlers that must satisfy §4.J's "subscribers must be
//! idempotent" contract: an LRU of recently seen `message_id`s, grounded in
//! the same `lru::LruCache` idiom `at-core::session_store` uses for its
//! bounded session cache.

use std::num::NonZeroUsize;

use lru::LruCache;

pub struct Deduper {
    seen: std::sync::Mutex<LruCache<String, ()>>,
}

impl Deduper {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { seen: std::sync::Mutex::new(LruCache::new(capacity)) }
    }

    /// Returns `true` the first time a given `message_id` is seen, `false`
    /// on every subsequent call -- a handler calls this at the top of its
    /// loop and skips processing when it returns `false`.
    pub fn first_sighting(&self, message_id: &str) -> bool {
        let mut seen = self.seen.lock().expect("deduper lock poisoned");
        if seen.contains(message_id) {
            false
        } else {
            seen.put(message_id.to_string(), ());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_true_once_then_false() {
        let d = Deduper::new(8);
        assert!(d.first_sighting("m1"));
        assert!(!d.first_sighting("m1"));
        assert!(d.first_sighting("m2"));
    }

    #[test]
    fn capacity_evicts_oldest_entries() {
        let d = Deduper::new(2);
        d.first_sighting("m1");
        d.first_sighting("m2");
        d.first_sighting("m3"); // evicts m1
        assert!(d.first_sighting("m1"));
    }
}
