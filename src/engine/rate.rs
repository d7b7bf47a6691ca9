//! Rate derivation from cumulative counters.
//!
//! A [`RateTracker`] keeps the previous observation of every stream and turns
//! each new `(value, instant)` pair into a per-second rate. The read and the
//! replacement of a stream's state happen under the map entry's lock, so two
//! concurrent observers of the same stream never compute against the same
//! stale baseline.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Observations closer together than this reuse the previous rate.
pub const DEFAULT_EPSILON: Duration = Duration::from_millis(100);

/// Result of feeding one counter reading into a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// No rate has been computed for the stream yet. Reported as 0.
    Baseline,
    /// A fresh rate from the delta against the previous reading.
    Computed(f64),
    /// The reading came within the epsilon window; the last rate is returned
    /// and the stream state is left untouched.
    Reused(f64),
}

impl Observation {
    pub fn rate(&self) -> f64 {
        match *self {
            Observation::Baseline => 0.0,
            Observation::Computed(rate) | Observation::Reused(rate) => rate,
        }
    }

    /// True when the value reflects an actual measured delta.
    pub fn is_measured(&self) -> bool {
        !matches!(self, Observation::Baseline)
    }
}

/// Previous reading of one stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateState {
    pub value: u64,
    pub at: Instant,
    pub last_rate: Option<f64>,
    pub missed_sweeps: u32,
}

/// Keyed store of per-stream baselines.
#[derive(Debug)]
pub struct RateTracker<K: Eq + Hash> {
    streams: DashMap<K, RateState>,
    epsilon: Duration,
}

impl<K: Eq + Hash + Clone> Default for RateTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> RateTracker<K> {
    pub fn new() -> Self {
        Self::with_epsilon(DEFAULT_EPSILON)
    }

    pub fn with_epsilon(epsilon: Duration) -> Self {
        Self {
            streams: DashMap::new(),
            epsilon,
        }
    }

    /// Observes `value` now.
    pub fn observe(&self, key: K, value: u64) -> Observation {
        self.observe_at(key, value, Instant::now())
    }

    /// Observes `value` at `at`.
    ///
    /// A counter that went backwards (restart, wraparound, device removal)
    /// yields 0 and becomes the new baseline. An `at` that is not later than
    /// the stored instant counts as a zero elapsed time.
    pub fn observe_at(&self, key: K, value: u64, at: Instant) -> Observation {
        match self.streams.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(RateState {
                    value,
                    at,
                    last_rate: None,
                    missed_sweeps: 0,
                });
                Observation::Baseline
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                let elapsed = at.saturating_duration_since(state.at);
                if elapsed <= self.epsilon {
                    return match state.last_rate {
                        Some(rate) => Observation::Reused(rate),
                        None => Observation::Baseline,
                    };
                }

                let rate = value.saturating_sub(state.value) as f64 / elapsed.as_secs_f64();
                state.value = value;
                state.at = at;
                state.last_rate = Some(rate);
                Observation::Computed(rate)
            }
        }
    }

    /// Copy of the stored state for `key`.
    pub fn state(&self, key: &K) -> Option<RateState> {
        self.streams.get(key).map(|state| *state)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.streams.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Ages every stream not reported live. Streams missing for `max_missed`
    /// consecutive sweeps are dropped; live streams have their count reset.
    /// Returns the number of streams removed.
    pub fn sweep(&self, is_live: impl Fn(&K) -> bool, max_missed: u32) -> usize {
        let mut removed = 0;
        self.streams.retain(|key, state| {
            if is_live(key) {
                state.missed_sweeps = 0;
                return true;
            }
            state.missed_sweeps += 1;
            if state.missed_sweeps >= max_missed {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}
