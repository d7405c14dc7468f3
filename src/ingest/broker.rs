//! Message broker abstraction for the ingestion pipeline.
//!
//! Events are published to a topic named after the event type, keyed by
//! entity id. Production uses Redis Streams; tests use the in-memory broker,
//! which can also be flipped into a failing mode to exercise the pipeline's
//! direct-storage fallback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

/// Broker publish failure.
///
/// These never propagate to the event producer; the pipeline logs them and
/// falls back to direct storage.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker rejected or never acknowledged the publish.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    /// The publish did not complete within the pipeline's bound.
    #[error("broker publish timed out")]
    Timeout,
}

/// A message accepted by a broker.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    /// Partition/routing key (entity id).
    pub key: String,
    /// Serialized event payload.
    pub payload: Vec<u8>,
}

/// Outbound publish interface for the ingestion pipeline.
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Publish a payload to `topic` with routing `key`.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Redis Streams broker.
///
/// Each topic maps to a stream `{prefix}:{topic}`; the entry carries the
/// routing key and payload as fields.
#[derive(Clone)]
pub struct RedisBroker {
    conn: redis::aio::ConnectionManager,
    stream_prefix: String,
}

impl RedisBroker {
    /// Create a broker over an established Redis connection.
    #[must_use]
    pub fn new(conn: redis::aio::ConnectionManager, stream_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            stream_prefix: stream_prefix.into(),
        }
    }
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("stream_prefix", &self.stream_prefix)
            .finish()
    }
}

#[async_trait]
impl EventBroker for RedisBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        use redis::AsyncCommands;

        let stream = format!("{}:{}", self.stream_prefix, topic);
        let mut conn = self.conn.clone();

        let _: String = conn
            .xadd(&stream, "*", &[("key", key.as_bytes()), ("payload", payload)])
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

/// In-process broker used by tests and by deployments without Redis.
///
/// Collects published messages per topic and can simulate outage via
/// [`InMemoryBroker::set_failing`].
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    topics: Mutex<HashMap<String, Vec<PublishedMessage>>>,
    failing: AtomicBool,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated broker outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages accepted on a topic so far.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<PublishedMessage> {
        self.topics
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Total messages accepted across all topics.
    #[must_use]
    pub fn total_published(&self) -> usize {
        self.topics.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("simulated outage".to_string()));
        }

        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(PublishedMessage {
                key: key.to_string(),
                payload: payload.to_vec(),
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_publish_records_message() {
        let broker = InMemoryBroker::new();
        broker
            .publish("state_changed", "sensor.temp", b"{}")
            .await
            .unwrap();

        let messages = broker.published("state_changed");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, "sensor.temp");
        assert_eq!(broker.total_published(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_failing_mode() {
        let broker = InMemoryBroker::new();
        broker.set_failing(true);

        let err = broker
            .publish("state_changed", "sensor.temp", b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert_eq!(broker.total_published(), 0);

        broker.set_failing(false);
        broker
            .publish("state_changed", "sensor.temp", b"{}")
            .await
            .unwrap();
        assert_eq!(broker.total_published(), 1);
    }
}
