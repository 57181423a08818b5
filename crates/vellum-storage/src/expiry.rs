//! Sliding-expiry map with an injectable clock.
//!
//! Entries carry a deadline that is pushed forward on every read. Expired
//! entries are dropped lazily on access and on [`ExpiringMap::sweep`].
//! Inserts prune the whole map at most once per idle lifetime.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default idle lifetime for cached entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }
}

struct Slot<V> {
    value: V,
    deadline: Instant,
}

struct Slots<K, V> {
    entries: HashMap<K, Slot<V>>,
    last_prune: Instant,
}

impl<K, V> Slots<K, V> {
    fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.deadline > now);
        self.last_prune = now;
        before - self.entries.len()
    }
}

/// Thread-safe map whose entries expire after a period without access.
pub struct ExpiringMap<K, V> {
    slots: Mutex<Slots<K, V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> fmt::Debug for ExpiringMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringMap")
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a map with the given idle lifetime.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_prune = clock.now();
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                last_prune,
            }),
            ttl,
            clock,
        }
    }

    /// Get a live entry and reset its deadline.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entries.get_mut(key)?;
        if slot.deadline <= now {
            slots.entries.remove(key);
            return None;
        }
        slot.deadline = now + self.ttl;
        Some(slot.value.clone())
    }

    /// Check whether a live entry exists, without touching it.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.slots
            .lock()
            .unwrap()
            .entries
            .get(key)
            .is_some_and(|slot| slot.deadline > now)
    }

    /// Insert or replace an entry.
    ///
    /// Expired entries are pruned here at most once per idle lifetime.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut slots = self.slots.lock().unwrap();
        if now.saturating_duration_since(slots.last_prune) >= self.ttl {
            slots.prune(now);
        }
        slots.entries.insert(
            key,
            Slot {
                value,
                deadline: now + self.ttl,
            },
        );
    }

    /// Remove an entry, returning it if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.slots
            .lock()
            .unwrap()
            .entries
            .remove(key)
            .filter(|slot| slot.deadline > now)
            .map(|slot| slot.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.slots.lock().unwrap().entries.clear();
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        self.slots.lock().unwrap().prune(now)
    }

    /// Copy out all live entries without touching their deadlines.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let now = self.clock.now();
        let mut slots = self.slots.lock().unwrap();
        slots.prune(now);
        slots
            .entries
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.lock().unwrap();
        slots.prune(now);
        slots.entries.len()
    }

    /// Whether no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn stored(&self) -> usize {
        self.slots.lock().unwrap().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(clock: &Arc<ManualClock>) -> ExpiringMap<String, u32> {
        let clock: Arc<dyn Clock> = Arc::<ManualClock>::clone(clock);
        ExpiringMap::new(Duration::from_secs(60), clock)
    }

    #[test]
    fn test_entry_expires_after_idle_period() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        cache.insert("a".to_owned(), 1);

        clock.advance(Duration::from_secs(59));
        assert!(cache.contains(&"a".to_owned()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a".to_owned()), None);
    }

    #[test]
    fn test_access_slides_deadline() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        cache.insert("a".to_owned(), 1);

        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.get(&"a".to_owned()), Some(1));

        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.get(&"a".to_owned()), Some(1));
    }

    #[test]
    fn test_contains_does_not_slide_deadline() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        cache.insert("a".to_owned(), 1);

        clock.advance(Duration::from_secs(45));
        assert!(cache.contains(&"a".to_owned()));
        clock.advance(Duration::from_secs(15));
        assert!(!cache.contains(&"a".to_owned()));
    }

    #[test]
    fn test_sweep_and_snapshot_drop_expired() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        cache.insert("old".to_owned(), 1);
        clock.advance(Duration::from_secs(30));
        cache.insert("new".to_owned(), 2);
        clock.advance(Duration::from_secs(31));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot, vec![("new".to_owned(), 2)]);
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_prunes_once_per_idle_period() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        clock.advance(Duration::from_secs(30));
        cache.insert("a".to_owned(), 1);
        clock.advance(Duration::from_secs(30));
        cache.insert("b".to_owned(), 2);

        // "a" expired at 90s, but the last prune ran at 60s
        clock.advance(Duration::from_secs(35));
        cache.insert("c".to_owned(), 3);
        assert_eq!(cache.stored(), 3);
        assert_eq!(cache.get(&"a".to_owned()), None);

        clock.advance(Duration::from_secs(25));
        cache.insert("d".to_owned(), 4);
        assert_eq!(cache.stored(), 2);
        assert_eq!(cache.get(&"c".to_owned()), Some(3));
    }

    #[test]
    fn test_many_inserts_keep_live_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        for i in 0..10_000 {
            cache.insert(format!("k{i}"), i);
        }

        assert_eq!(cache.len(), 10_000);
        assert_eq!(cache.get(&"k9999".to_owned()), Some(9999));
    }

    #[test]
    fn test_remove_and_clear() {
        let clock = Arc::new(ManualClock::new());
        let cache = map(&clock);
        cache.insert("a".to_owned(), 1);
        cache.insert("b".to_owned(), 2);

        assert_eq!(cache.remove(&"a".to_owned()), Some(1));
        assert_eq!(cache.remove(&"a".to_owned()), None);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expiring_map_is_send_sync() {
        static_assertions::assert_impl_all!(ExpiringMap<String, Vec<u8>>: Send, Sync);
    }
}
