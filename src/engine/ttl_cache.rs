//! Per-key time-windowed cache with single-flight recomputation.
//!
//! Every key owns a slot behind its own mutex. A caller that finds the slot
//! stale computes while holding that slot, so callers racing on the same key
//! wait and then share the fresh value. The map lock is only held long
//! enough to fetch the slot, so distinct keys never wait on each other.

use dashmap::DashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A stored value and the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now - stored_at <= ttl`.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= ttl
    }
}

/// How a value was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<V> {
    Hit(V),
    Computed(V),
}

impl<V> Fetch<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Fetch::Hit(_))
    }

    pub fn into_value(self) -> V {
        match self {
            Fetch::Hit(value) | Fetch::Computed(value) => value,
        }
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

#[derive(Debug)]
pub struct TtlCache<V> {
    slots: DashMap<String, Slot<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot(&self, key: &str) -> Slot<V> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        let slot = self.slots.entry(key.to_string()).or_default();
        Arc::clone(slot.value())
    }

    pub fn get_or_compute(&self, key: &str, ttl: Duration, compute: impl FnOnce() -> V) -> V {
        self.get_or_compute_at(key, ttl, Instant::now(), compute)
    }

    pub fn get_or_compute_at(
        &self,
        key: &str,
        ttl: Duration,
        now: Instant,
        compute: impl FnOnce() -> V,
    ) -> V {
        match self.try_get_or_compute_at(key, ttl, now, || Ok::<V, Infallible>(compute())) {
            Ok(fetch) => fetch.into_value(),
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for fallible
    /// computations. Errors are returned to the caller and not stored.
    pub fn try_get_or_compute<E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Fetch<V>, E> {
        self.try_get_or_compute_at(key, ttl, Instant::now(), compute)
    }

    pub fn try_get_or_compute_at<E>(
        &self,
        key: &str,
        ttl: Duration,
        now: Instant,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Fetch<V>, E> {
        let slot = self.slot(key);
        // A panic inside a previous computation leaves the slot as it was
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = entry.as_ref() {
            if cached.is_fresh(ttl, now) {
                return Ok(Fetch::Hit(cached.value.clone()));
            }
        }

        let value = compute()?;
        *entry = Some(CacheEntry {
            value: value.clone(),
            stored_at: now,
        });
        Ok(Fetch::Computed(value))
    }

    /// Number of keys ever requested.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of keys holding a value that is fresh at `now`.
    pub fn fresh_count(&self, ttl: Duration, now: Instant) -> usize {
        let slots: Vec<Slot<V>> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();
        slots
            .iter()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                    .is_some_and(|entry| entry.is_fresh(ttl, now))
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_hit_within_ttl() {
        let cache = TtlCache::new();
        let calls = Cell::new(0);
        let t0 = Instant::now();
        let ttl = Duration::from_secs(5);

        let compute = || {
            calls.set(calls.get() + 1);
            calls.get()
        };
        assert_eq!(cache.get_or_compute_at("cpu", ttl, t0, compute), 1);
        assert_eq!(cache.get_or_compute_at("cpu", ttl, t0 + Duration::from_secs(5), compute), 1);
        assert_eq!(cache.get_or_compute_at("cpu", ttl, t0 + Duration::from_secs(6), compute), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = TtlCache::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(1);
        cache.get_or_compute_at("cpu", ttl, t0, || 1);
        assert_eq!(cache.get_or_compute_at("memory", ttl, t0, || 2), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(10);

        let err: Result<Fetch<u32>, &str> = cache.try_get_or_compute_at("disk", ttl, t0, || Err("boom"));
        assert!(err.is_err());

        let ok = cache.try_get_or_compute_at::<&str>("disk", ttl, t0, || Ok(7)).unwrap();
        assert_eq!(ok, Fetch::Computed(7));
        let hit = cache.try_get_or_compute_at::<&str>("disk", ttl, t0, || Ok(8)).unwrap();
        assert_eq!(hit, Fetch::Hit(7));
    }

    #[test]
    fn test_failed_refresh_leaves_entry_stale() {
        let cache: TtlCache<u32> = TtlCache::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(1);
        cache.get_or_compute_at("ip", ttl, t0, || 1);

        let later = t0 + Duration::from_secs(2);
        assert!(cache
            .try_get_or_compute_at("ip", ttl, later, || Err::<u32, _>("down"))
            .is_err());
        assert_eq!(cache.fresh_count(ttl, later), 0);
    }
}
