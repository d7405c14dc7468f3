//! Direct event storage used by the pipeline's fallback path.
//!
//! When a broker publish fails, the pipeline writes the event synchronously
//! through this trait so the event is never lost. The downstream consumer
//! that normally persists events after the broker is an external
//! collaborator; only the fallback write surface lives here.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::events::RawEvent;

/// Storage write failure. Fatal for the event in question (counted, not
/// retried) so a storage outage cannot grow an unbounded backlog.
#[derive(Debug, thiserror::Error)]
#[error("event storage write failed: {0}")]
pub struct StoreError(pub String);

/// Synchronous event persistence for the fallback path.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a single event.
    async fn store_event(&self, event: &RawEvent) -> Result<(), StoreError>;
}

/// In-memory event store for tests and brokerless deployments.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<RawEvent>>,
    failing: AtomicBool,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated storage outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All stored events, in write order.
    #[must_use]
    pub fn events(&self) -> Vec<RawEvent> {
        self.events.lock().clone()
    }

    /// Look up a stored event by id.
    #[must_use]
    pub fn find(&self, id: Uuid) -> Option<RawEvent> {
        self.events.lock().iter().find(|e| e.id == id).cloned()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn store_event(&self, event: &RawEvent) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError("simulated outage".to_string()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    #[tokio::test]
    async fn test_store_and_find() {
        let store = InMemoryEventStore::new();
        let event = RawEvent::new("switch.garage", EventType::StateChanged, None, None);
        let id = event.id;

        store.store_event(&event).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find(id).unwrap().entity_id, "switch.garage");
        assert!(store.find(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let store = InMemoryEventStore::new();
        store.set_failing(true);

        let event = RawEvent::new("switch.garage", EventType::StateChanged, None, None);
        assert!(store.store_event(&event).await.is_err());
        assert!(store.is_empty());
    }
}
