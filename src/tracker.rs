//! Held-key bookkeeping for the four movement keys

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::clock::Clock;
use crate::keys::{KeySet, TrackedKey};

/// Outcome of releasing a held key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    /// How long the key was held
    pub held_for: Duration,
    /// Tracked keys still held after this release
    pub still_held: KeySet,
    /// Every key held since the held set was last empty, this one included
    pub chord: KeySet,
}

impl Release {
    /// True if the release left other movement keys down
    pub fn others_held(&self) -> bool {
        !self.still_held.is_empty()
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    held: KeySet,
    chord: KeySet,
    press_start: [Option<Instant>; 4],
}

fn slot(key: TrackedKey) -> usize {
    match key {
        TrackedKey::Forward => 0,
        TrackedKey::Back => 1,
        TrackedKey::Left => 2,
        TrackedKey::Right => 3,
    }
}

/// Tracks which movement keys are down and since when
///
/// Every method takes the lock for the state update only; callers act on
/// the returned values after it is released.
pub struct KeyStateTracker {
    state: Mutex<TrackerState>,
    clock: Arc<dyn Clock>,
}

impl KeyStateTracker {
    /// Create a new tracker with nothing held
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            clock,
        }
    }

    /// Record a key down; returns true for the first down, false for repeats.
    ///
    /// Repeats keep the original press time.
    pub fn on_press(&self, key: TrackedKey) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.held.contains(key) {
            return false;
        }
        if state.held.is_empty() {
            state.chord = KeySet::EMPTY;
        }
        state.held.insert(key);
        state.chord.insert(key);
        state.press_start[slot(key)] = Some(now);
        trace!(key = %key, held = %state.held, "press");
        true
    }

    /// Record a key up and return how long it was held.
    ///
    /// `None` for a key that was not held.
    pub fn on_release(&self, key: TrackedKey) -> Option<Duration> {
        self.release(key).map(|r| r.held_for)
    }

    /// Record a key up and snapshot the remaining state in one step
    pub fn release(&self, key: TrackedKey) -> Option<Release> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if !state.held.remove(key) {
            return None;
        }
        let started = state.press_start[slot(key)].take()?;
        trace!(key = %key, held = %state.held, "release");
        Some(Release {
            held_for: now.saturating_duration_since(started),
            still_held: state.held,
            chord: state.chord,
        })
    }

    /// True if any tracked key other than `excluding` is down
    pub fn is_any_other_held(&self, excluding: TrackedKey) -> bool {
        !self.state.lock().held.without(excluding).is_empty()
    }

    /// True if the key is currently down
    pub fn is_held(&self, key: TrackedKey) -> bool {
        self.state.lock().held.contains(key)
    }

    /// Snapshot of the held set
    pub fn held(&self) -> KeySet {
        self.state.lock().held
    }

    /// Forget every held key
    pub fn reset(&self) {
        *self.state.lock() = TrackerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn tracker() -> (Arc<ManualClock>, KeyStateTracker) {
        let clock = Arc::new(ManualClock::new());
        let tracker = KeyStateTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn press_release_reports_duration() {
        let (clock, tracker) = tracker();
        assert!(tracker.on_press(TrackedKey::Forward));
        clock.advance(Duration::from_millis(50));
        assert_eq!(
            tracker.on_release(TrackedKey::Forward),
            Some(Duration::from_millis(50))
        );
        assert!(!tracker.is_held(TrackedKey::Forward));
    }

    #[test]
    fn repeated_press_keeps_original_start() {
        let (clock, tracker) = tracker();
        tracker.on_press(TrackedKey::Left);
        clock.advance(Duration::from_millis(30));
        assert!(!tracker.on_press(TrackedKey::Left));
        clock.advance(Duration::from_millis(30));
        assert_eq!(
            tracker.on_release(TrackedKey::Left),
            Some(Duration::from_millis(60))
        );
    }

    #[test]
    fn spurious_release_is_ignored() {
        let (_clock, tracker) = tracker();
        assert_eq!(tracker.on_release(TrackedKey::Back), None);

        tracker.on_press(TrackedKey::Back);
        assert!(tracker.on_release(TrackedKey::Back).is_some());
        assert_eq!(tracker.on_release(TrackedKey::Back), None);
        assert!(tracker.held().is_empty());
    }

    #[test]
    fn other_held_excludes_the_queried_key() {
        let (_clock, tracker) = tracker();
        tracker.on_press(TrackedKey::Forward);
        assert!(!tracker.is_any_other_held(TrackedKey::Forward));

        tracker.on_press(TrackedKey::Left);
        assert!(tracker.is_any_other_held(TrackedKey::Forward));
        assert!(tracker.is_any_other_held(TrackedKey::Left));
        assert!(tracker.is_any_other_held(TrackedKey::Back));
    }

    #[test]
    fn chord_accumulates_until_all_released() {
        let (_clock, tracker) = tracker();
        tracker.on_press(TrackedKey::Forward);
        tracker.on_press(TrackedKey::Left);

        let first = tracker.release(TrackedKey::Forward).unwrap();
        assert!(first.others_held());
        assert_eq!(first.still_held, [TrackedKey::Left].into_iter().collect::<KeySet>());

        let last = tracker.release(TrackedKey::Left).unwrap();
        assert!(!last.others_held());
        assert_eq!(
            last.chord,
            [TrackedKey::Forward, TrackedKey::Left].into_iter().collect::<KeySet>()
        );

        tracker.on_press(TrackedKey::Back);
        let fresh = tracker.release(TrackedKey::Back).unwrap();
        assert_eq!(fresh.chord, [TrackedKey::Back].into_iter().collect::<KeySet>());
    }

    #[test]
    fn reset_clears_everything() {
        let (_clock, tracker) = tracker();
        tracker.on_press(TrackedKey::Right);
        tracker.reset();
        assert!(tracker.held().is_empty());
        assert_eq!(tracker.on_release(TrackedKey::Right), None);
    }

    fn event() -> impl Strategy<Value = (bool, usize, u64)> {
        (any::<bool>(), 0usize..4, 0u64..200)
    }

    proptest! {
        #[test]
        fn held_set_matches_event_history(events in prop::collection::vec(event(), 0..64)) {
            let (clock, tracker) = tracker();
            let mut expected_start: [Option<u64>; 4] = [None; 4];
            let mut now = 0u64;

            for (is_press, idx, gap) in events {
                clock.advance(Duration::from_millis(gap));
                now += gap;
                let key = TrackedKey::ALL[idx];
                if is_press {
                    let fresh = tracker.on_press(key);
                    prop_assert_eq!(fresh, expected_start[idx].is_none());
                    if expected_start[idx].is_none() {
                        expected_start[idx] = Some(now);
                    }
                } else {
                    let got = tracker.on_release(key);
                    let want = expected_start[idx].take().map(|s| Duration::from_millis(now - s));
                    prop_assert_eq!(got, want);
                }
                for (i, k) in TrackedKey::ALL.into_iter().enumerate() {
                    prop_assert_eq!(tracker.is_held(k), expected_start[i].is_some());
                }
            }
        }
    }
}
