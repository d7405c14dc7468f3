//! Raw event model for the platform connector stream.
//!
//! Events arrive from the upstream home-automation platform as state-change
//! notifications. Delivery is at-least-once and ordering is only guaranteed
//! per entity, so every event carries its own timestamp and source connection
//! id. A [`RawEvent`] is immutable once received; its lifecycle ends at either
//! persistence or discard.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of state-change notification emitted by the platform.
///
/// Unknown types deserialize into [`EventType::Other`] so a connector upgrade
/// never breaks ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// An entity's state changed.
    StateChanged,
    /// An automation fired on the platform.
    AutomationTriggered,
    /// A service/action was invoked.
    ServiceCalled,
    /// A new device registered with the platform.
    DeviceRegistered,
    /// A scene was activated.
    SceneActivated,
    /// Any event type this core does not model explicitly.
    #[serde(untagged)]
    Other(String),
}

impl EventType {
    /// String form used as the broker topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::StateChanged => "state_changed",
            Self::AutomationTriggered => "automation_triggered",
            Self::ServiceCalled => "service_called",
            Self::DeviceRegistered => "device_registered",
            Self::SceneActivated => "scene_activated",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Parse an event type from its wire/config string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "state_changed" => Self::StateChanged,
            "automation_triggered" => Self::AutomationTriggered,
            "service_called" => Self::ServiceCalled,
            "device_registered" => Self::DeviceRegistered,
            "scene_activated" => Self::SceneActivated,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state-change notification received from the platform connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Unique event identifier (assigned at receipt).
    pub id: Uuid,
    /// Platform entity id, e.g. `sensor.temperature` or `switch.garage`.
    pub entity_id: String,
    /// Kind of notification.
    pub event_type: EventType,
    /// State value before the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_state: Option<String>,
    /// State value after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    /// Free-form attribute payload attached by the platform.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub attributes: serde_json::Value,
    /// When the change occurred on the platform.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Upstream connection this event arrived on.
    #[serde(default)]
    pub source_connection_id: String,
}

impl RawEvent {
    /// Create an event with a fresh id, stamped now.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        event_type: EventType,
        old_state: Option<String>,
        new_state: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id: entity_id.into(),
            event_type,
            old_state,
            new_state,
            attributes: serde_json::Value::Null,
            timestamp: chrono::Utc::now(),
            source_connection_id: String::new(),
        }
    }

    /// Attach an attribute payload.
    #[must_use]
    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// Tag the event with its source connection.
    #[must_use]
    pub fn with_source(mut self, connection_id: impl Into<String>) -> Self {
        self.source_connection_id = connection_id.into();
        self
    }

    /// The entity's domain, i.e. the part of the entity id before the dot.
    ///
    /// Returns the whole id when there is no dot.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }
}
