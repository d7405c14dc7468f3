//! Event classification and down-sampling policy.
//!
//! The classifier is a pure decision function over an event and a frequency
//! counter snapshot: it has no side effect beyond incrementing the counter
//! for the event it inspects. Policy, in priority order:
//!
//! 1. Event types on the always-important allow-list are stored.
//! 2. Entities (or their domains) on the important allow-list are stored.
//! 3. Significant state transitions (binary flips, unit-threshold crossings)
//!    are stored.
//! 4. Everything else is counted; once a key exceeds the high-frequency
//!    threshold within the window, only a configured fraction is retained
//!    and the rest is sampled out.
//!
//! Allow-lists are loaded from configuration and validated at startup rather
//! than matched against string literals in code.

use std::collections::HashSet;

use crate::config::SamplingConfig;
use crate::events::{EventType, RawEvent};
use crate::ingest::frequency::FrequencyTracker;

/// Outcome of classifying a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Persist the event.
    Store,
    /// Discard the event; it carries no decision value.
    Drop,
    /// Discarded by high-frequency down-sampling.
    Sample,
}

impl Disposition {
    /// String form for logging and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Drop => "drop",
            Self::Sample => "sample",
        }
    }
}

/// States treated as binary for transition significance.
const BINARY_STATES: [&str; 12] = [
    "on", "off", "open", "closed", "locked", "unlocked", "home", "away", "true", "false",
    "detected", "clear",
];

/// Configuration-driven event classifier.
#[derive(Debug)]
pub struct EventClassifier {
    important_event_types: HashSet<EventType>,
    important_entities: HashSet<String>,
    important_domains: HashSet<String>,
    high_frequency_threshold: u32,
    sample_fraction: f64,
}

impl EventClassifier {
    /// Build a classifier from validated sampling configuration.
    #[must_use]
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            important_event_types: config
                .important_event_types
                .iter()
                .map(|s| EventType::parse(s))
                .collect(),
            important_entities: config.important_entities.iter().cloned().collect(),
            important_domains: config.important_domains.iter().cloned().collect(),
            high_frequency_threshold: config.high_frequency_threshold,
            sample_fraction: config.sample_fraction,
        }
    }

    /// Classify an event against a frequency tracker.
    ///
    /// The only side effect is incrementing the (entity, type) counter when
    /// the event reaches the frequency tier of the policy.
    pub fn classify(&self, event: &RawEvent, counters: &FrequencyTracker) -> Disposition {
        self.classify_with_draw(event, counters, rand::random::<f64>())
    }

    /// Classification with an explicit sampling draw in `[0, 1)`.
    ///
    /// Exposed so the sampling branch is deterministic under test.
    pub fn classify_with_draw(
        &self,
        event: &RawEvent,
        counters: &FrequencyTracker,
        draw: f64,
    ) -> Disposition {
        if event.entity_id.is_empty() {
            return Disposition::Drop;
        }

        if self.important_event_types.contains(&event.event_type) {
            return Disposition::Store;
        }

        if self.important_entities.contains(&event.entity_id)
            || self.important_domains.contains(event.domain())
        {
            return Disposition::Store;
        }

        if is_significant_transition(event.old_state.as_deref(), event.new_state.as_deref()) {
            return Disposition::Store;
        }

        let count = counters.observe(&event.entity_id, &event.event_type);
        if count > self.high_frequency_threshold {
            if draw < self.sample_fraction {
                Disposition::Store
            } else {
                Disposition::Sample
            }
        } else {
            Disposition::Store
        }
    }
}

/// Whether a state transition is significant enough to store outright.
///
/// Binary flips always are. Numeric values are significant when they cross a
/// unit boundary, which filters sub-degree sensor jitter without losing real
/// movement. Identical states never are.
fn is_significant_transition(old: Option<&str>, new: Option<&str>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };
    if old == new {
        return false;
    }

    let old_lower = old.to_ascii_lowercase();
    let new_lower = new.to_ascii_lowercase();
    if BINARY_STATES.contains(&old_lower.as_str()) && BINARY_STATES.contains(&new_lower.as_str()) {
        return true;
    }

    if let (Ok(old_num), Ok(new_num)) = (old.parse::<f64>(), new.parse::<f64>()) {
        return old_num.trunc() != new_num.trunc() || (old_num - new_num).abs() >= 1.0;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> SamplingConfig {
        SamplingConfig {
            window_secs: 1,
            high_frequency_threshold: 10,
            sample_fraction: 0.1,
            important_event_types: vec!["automation_triggered".into()],
            important_entities: vec!["switch.garage".into()],
            important_domains: vec!["binary_sensor".into(), "lock".into(), "alarm_control_panel".into()],
        }
    }

    fn classifier() -> EventClassifier {
        EventClassifier::new(&test_config())
    }

    fn tracker() -> FrequencyTracker {
        FrequencyTracker::new(Duration::from_secs(1))
    }

    #[test]
    fn test_allow_listed_event_type_always_stored() {
        let c = classifier();
        let t = tracker();
        for _ in 0..100 {
            let event = RawEvent::new(
                "automation.morning",
                EventType::AutomationTriggered,
                None,
                None,
            );
            assert_eq!(c.classify(&event, &t), Disposition::Store);
        }
    }

    #[test]
    fn test_allow_listed_entity_stored() {
        let c = classifier();
        let event = RawEvent::new("switch.garage", EventType::StateChanged, None, None);
        assert_eq!(c.classify(&event, &tracker()), Disposition::Store);
    }

    #[test]
    fn test_important_domain_stored() {
        let c = classifier();
        let event = RawEvent::new(
            "binary_sensor.hallway_motion",
            EventType::StateChanged,
            Some("off".into()),
            Some("off".into()),
        );
        assert_eq!(c.classify(&event, &tracker()), Disposition::Store);
    }

    #[test]
    fn test_empty_entity_dropped() {
        let c = classifier();
        let event = RawEvent::new("", EventType::StateChanged, None, None);
        assert_eq!(c.classify(&event, &tracker()), Disposition::Drop);
    }

    #[test]
    fn test_binary_flip_is_significant() {
        assert!(is_significant_transition(Some("on"), Some("off")));
        assert!(is_significant_transition(Some("locked"), Some("unlocked")));
        assert!(!is_significant_transition(Some("on"), Some("on")));
    }

    #[test]
    fn test_numeric_threshold_crossing() {
        assert!(is_significant_transition(Some("21.9"), Some("22.1")));
        assert!(is_significant_transition(Some("10"), Some("12")));
        assert!(!is_significant_transition(Some("21.1"), Some("21.4")));
    }

    #[test]
    fn test_missing_states_not_significant() {
        assert!(!is_significant_transition(None, Some("on")));
        assert!(!is_significant_transition(Some("on"), None));
        assert!(!is_significant_transition(None, None));
    }

    #[test]
    fn test_low_frequency_stored() {
        let c = classifier();
        let t = tracker();
        for _ in 0..10 {
            let event = RawEvent::new(
                "sensor.temperature",
                EventType::StateChanged,
                Some("21.1".into()),
                Some("21.2".into()),
            );
            assert_eq!(c.classify(&event, &t), Disposition::Store);
        }
    }

    #[test]
    fn test_high_frequency_sampling_uses_draw() {
        let c = classifier();
        let t = tracker();

        // Push past the threshold first.
        for _ in 0..10 {
            let event = RawEvent::new(
                "sensor.temperature",
                EventType::StateChanged,
                Some("21.1".into()),
                Some("21.2".into()),
            );
            c.classify(&event, &t);
        }

        let event = RawEvent::new(
            "sensor.temperature",
            EventType::StateChanged,
            Some("21.1".into()),
            Some("21.2".into()),
        );
        assert_eq!(c.classify_with_draw(&event, &t, 0.05), Disposition::Store);

        let event = RawEvent::new(
            "sensor.temperature",
            EventType::StateChanged,
            Some("21.1".into()),
            Some("21.2".into()),
        );
        assert_eq!(c.classify_with_draw(&event, &t, 0.95), Disposition::Sample);
    }
}
