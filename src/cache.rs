use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// TTL cache keyed by the SHA-256 of the request reference.
pub struct ResponseCache<V> {
    entries: Mutex<HashMap<String, (V, Instant)>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn key(reference: &str) -> String {
        format!("{:x}", Sha256::digest(reference.as_bytes()))
    }

    /// Returns a live entry. An expired one is evicted.
    pub fn get(&self, reference: &str) -> Option<V> {
        let key = Self::key(reference);
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match entries.get(&key) {
            Some((value, stored)) if now.duration_since(*stored) < self.ttl => {
                log::trace!("Cache hit for {}", key);
                return Some(value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            log::debug!("Evicting expired cache entry {}", key);
            entries.remove(&key);
        }
        None
    }

    pub fn put(&self, reference: &str, value: V) {
        let key = Self::key(reference);
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, (value, now));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A clock that only moves when told to.
    pub struct ManualClock {
        start: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResponseCache::with_clock(Duration::from_secs(300), clock.clone());

        cache.put("https://example.com/a.jpg", 1);
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("https://example.com/a.jpg"), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("https://example.com/a.jpg"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn put_overwrites_and_refreshes() {
        let clock = Arc::new(ManualClock::new());
        let cache = ResponseCache::with_clock(Duration::from_secs(10), clock.clone());

        cache.put("a", "old");
        clock.advance(Duration::from_secs(8));
        cache.put("a", "new");
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("a"), Some("new"));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_sha256_hex() {
        assert_eq!(
            ResponseCache::<()>::key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
