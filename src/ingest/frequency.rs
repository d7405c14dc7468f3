//! Sliding-window frequency counters keyed by (entity id, event type).
//!
//! The classifier uses these counts to detect chatty entities and apply
//! probabilistic down-sampling. Windows are tracked per key and reset when
//! the window elapses, so a count never outlives its window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::events::EventType;

/// Counter key: one window per (entity, event type) pair.
type CounterKey = (String, EventType);

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Rolling per-key event counters over a fixed window.
///
/// Thread-safe; producers from multiple upstream connections observe into the
/// same tracker. The map is pruned lazily on observation and explicitly via
/// [`FrequencyTracker::prune`].
#[derive(Debug)]
pub struct FrequencyTracker {
    windows: Mutex<HashMap<CounterKey, Window>>,
    window: Duration,
}

impl FrequencyTracker {
    /// Create a tracker with the given window length.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record one occurrence for the key and return the count within the
    /// current window, including this occurrence.
    ///
    /// An elapsed window is discarded and the count restarts at 1.
    pub fn observe(&self, entity_id: &str, event_type: &EventType) -> u32 {
        let mut windows = self.windows.lock();
        let now = Instant::now();

        let entry = windows
            .entry((entity_id.to_string(), event_type.clone()))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count
    }

    /// Current count for a key without incrementing.
    #[must_use]
    pub fn count(&self, entity_id: &str, event_type: &EventType) -> u32 {
        let windows = self.windows.lock();
        windows
            .get(&(entity_id.to_string(), event_type.clone()))
            .filter(|w| w.started_at.elapsed() < self.window)
            .map_or(0, |w| w.count)
    }

    /// Drop every window that has fully elapsed.
    ///
    /// Keeps the map bounded under long-running ingestion with a churning
    /// entity population.
    pub fn prune(&self) {
        let mut windows = self.windows.lock();
        let window = self.window;
        windows.retain(|_, w| w.started_at.elapsed() < window);
    }

    /// Number of live keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_increments_within_window() {
        let tracker = FrequencyTracker::new(Duration::from_secs(60));

        assert_eq!(tracker.observe("sensor.temp", &EventType::StateChanged), 1);
        assert_eq!(tracker.observe("sensor.temp", &EventType::StateChanged), 2);
        assert_eq!(tracker.observe("sensor.temp", &EventType::StateChanged), 3);
        assert_eq!(tracker.count("sensor.temp", &EventType::StateChanged), 3);
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = FrequencyTracker::new(Duration::from_secs(60));

        tracker.observe("sensor.temp", &EventType::StateChanged);
        tracker.observe("sensor.temp", &EventType::StateChanged);
        assert_eq!(tracker.observe("sensor.humidity", &EventType::StateChanged), 1);
        assert_eq!(
            tracker.observe("sensor.temp", &EventType::AutomationTriggered),
            1
        );
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let tracker = FrequencyTracker::new(Duration::from_millis(20));

        tracker.observe("sensor.temp", &EventType::StateChanged);
        tracker.observe("sensor.temp", &EventType::StateChanged);

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(tracker.count("sensor.temp", &EventType::StateChanged), 0);
        assert_eq!(tracker.observe("sensor.temp", &EventType::StateChanged), 1);
    }

    #[test]
    fn test_prune_drops_elapsed_windows() {
        let tracker = FrequencyTracker::new(Duration::from_millis(10));

        tracker.observe("sensor.a", &EventType::StateChanged);
        tracker.observe("sensor.b", &EventType::StateChanged);
        assert_eq!(tracker.tracked_keys(), 2);

        std::thread::sleep(Duration::from_millis(20));
        tracker.prune();
        assert_eq!(tracker.tracked_keys(), 0);
    }
}
