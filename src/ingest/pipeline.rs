//! Event ingestion pipeline.
//!
//! Entry point for the platform connector's event stream. `ingest` never
//! returns an error to the caller: events that pass classification are
//! serialized and published to the broker topic named after their event
//! type, and a publish or serialization failure falls back to a synchronous
//! direct-storage write so the event is not lost. Storage failures on the
//! fallback path are fatal for that event and are counted rather than
//! retried.
//!
//! Classification runs once, before publish. Events reaching the fallback
//! are therefore stored unconditionally; they are never re-sampled.
//!
//! All counters are atomic; the pipeline is shared across one producer task
//! per upstream connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::events::RawEvent;
use crate::ingest::broker::EventBroker;
use crate::ingest::classifier::{Disposition, EventClassifier};
use crate::ingest::frequency::FrequencyTracker;
use crate::ingest::store::EventStore;

/// Monotonic ingestion counters. Reset only by explicit operator action.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    processed: AtomicU64,
    stored: AtomicU64,
    filtered: AtomicU64,
    sampled_out: AtomicU64,
    broker_published: AtomicU64,
    fallback_stored: AtomicU64,
    failed: AtomicU64,
    latency_total_micros: AtomicU64,
}

/// Point-in-time view of [`ProcessingStats`], exposed on the operator
/// stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStatsSnapshot {
    /// Events handed to `ingest`.
    pub processed: u64,
    /// Events persisted (broker or fallback path).
    pub stored: u64,
    /// Events dropped by classification.
    pub filtered: u64,
    /// Events discarded by high-frequency down-sampling.
    pub sampled_out: u64,
    /// Events acknowledged by the broker.
    pub broker_published: u64,
    /// Events persisted via the direct-storage fallback.
    pub fallback_stored: u64,
    /// Events lost to a fallback storage failure.
    pub failed: u64,
    /// Fraction of processed events not stored.
    pub filter_rate: f64,
    /// Rolling average ingest latency in microseconds.
    pub avg_latency_micros: f64,
}

impl ProcessingStats {
    /// Create zeroed stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> ProcessingStatsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let stored = self.stored.load(Ordering::Relaxed);
        let filtered = self.filtered.load(Ordering::Relaxed);
        let sampled_out = self.sampled_out.load(Ordering::Relaxed);
        let latency_total = self.latency_total_micros.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss, reason = "operator-facing ratios")]
        let (filter_rate, avg_latency_micros) = if processed == 0 {
            (0.0, 0.0)
        } else {
            (
                (filtered + sampled_out) as f64 / processed as f64,
                latency_total as f64 / processed as f64,
            )
        };

        ProcessingStatsSnapshot {
            processed,
            stored,
            filtered,
            sampled_out,
            broker_published: self.broker_published.load(Ordering::Relaxed),
            fallback_stored: self.fallback_stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            filter_rate,
            avg_latency_micros,
        }
    }

    /// Zero every counter. Explicit operator action.
    pub fn reset(&self) {
        self.processed.store(0, Ordering::Relaxed);
        self.stored.store(0, Ordering::Relaxed);
        self.filtered.store(0, Ordering::Relaxed);
        self.sampled_out.store(0, Ordering::Relaxed);
        self.broker_published.store(0, Ordering::Relaxed);
        self.fallback_stored.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.latency_total_micros.store(0, Ordering::Relaxed);
    }

    fn record_latency(&self, elapsed: Duration) {
        #[allow(clippy::cast_possible_truncation, reason = "micros fit u64 for any sane latency")]
        let micros = elapsed.as_micros() as u64;
        self.latency_total_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

/// The ingestion pipeline: classify, publish, fall back, count.
pub struct IngestionPipeline {
    classifier: EventClassifier,
    tracker: FrequencyTracker,
    broker: Arc<dyn EventBroker>,
    store: Arc<dyn EventStore>,
    stats: Arc<ProcessingStats>,
    publish_timeout: Duration,
    fallback_timeout: Duration,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("publish_timeout", &self.publish_timeout)
            .field("fallback_timeout", &self.fallback_timeout)
            .finish()
    }
}

impl IngestionPipeline {
    /// Assemble a pipeline. Stats are injected so multiple pipelines can be
    /// observed independently in tests.
    #[must_use]
    pub fn new(
        classifier: EventClassifier,
        tracker: FrequencyTracker,
        broker: Arc<dyn EventBroker>,
        store: Arc<dyn EventStore>,
        stats: Arc<ProcessingStats>,
        publish_timeout: Duration,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            tracker,
            broker,
            store,
            stats,
            publish_timeout,
            fallback_timeout,
        }
    }

    /// The pipeline's stats handle.
    #[must_use]
    pub fn stats(&self) -> Arc<ProcessingStats> {
        Arc::clone(&self.stats)
    }

    /// Ingest one event. Infallible from the caller's perspective: transport
    /// and storage failures are absorbed, counted, and logged.
    pub async fn ingest(&self, event: RawEvent) {
        let started = Instant::now();
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        match self.classifier.classify(&event, &self.tracker) {
            Disposition::Drop => {
                self.stats.filtered.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(entity_id = %event.entity_id, "Event filtered");
            }
            Disposition::Sample => {
                self.stats.sampled_out.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(entity_id = %event.entity_id, "Event sampled out");
            }
            Disposition::Store => {
                self.forward(&event).await;
            }
        }

        self.stats.record_latency(started.elapsed());
    }

    /// Publish to the broker, falling back to direct storage on any failure.
    async fn forward(&self, event: &RawEvent) {
        let topic = event.event_type.as_str().to_string();

        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    event_id = %event.id,
                    error = %e,
                    "Event serialization failed, using direct storage"
                );
                self.store_direct(event).await;
                return;
            }
        };

        let publish = self
            .broker
            .publish(&topic, &event.entity_id, &payload);

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                self.stats.stored.fetch_add(1, Ordering::Relaxed);
                self.stats.broker_published.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    event_id = %event.id,
                    topic = %topic,
                    error = %e,
                    "Broker publish failed, using direct storage"
                );
                self.store_direct(event).await;
            }
            Err(_) => {
                tracing::warn!(
                    event_id = %event.id,
                    topic = %topic,
                    timeout_ms = self.publish_timeout.as_millis() as u64,
                    "Broker publish timed out, using direct storage"
                );
                self.store_direct(event).await;
            }
        }
    }

    /// Synchronous direct-storage write, bounded by the fallback timeout.
    async fn store_direct(&self, event: &RawEvent) {
        let write = self.store.store_event(event);

        match tokio::time::timeout(self.fallback_timeout, write).await {
            Ok(Ok(())) => {
                self.stats.stored.fetch_add(1, Ordering::Relaxed);
                self.stats.fallback_stored.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(event_id = %event.id, error = %e, "Fallback storage write failed");
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(event_id = %event.id, "Fallback storage write timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingConfig;
    use crate::events::EventType;
    use crate::ingest::broker::InMemoryBroker;
    use crate::ingest::store::InMemoryEventStore;

    fn pipeline_with(
        broker: Arc<InMemoryBroker>,
        store: Arc<InMemoryEventStore>,
    ) -> IngestionPipeline {
        let config = SamplingConfig {
            window_secs: 1,
            high_frequency_threshold: 10,
            sample_fraction: 0.1,
            important_event_types: vec!["automation_triggered".into()],
            important_entities: vec![],
            important_domains: vec![],
        };

        IngestionPipeline::new(
            EventClassifier::new(&config),
            FrequencyTracker::new(Duration::from_secs(1)),
            broker,
            store,
            Arc::new(ProcessingStats::new()),
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_stored_event_published_to_type_topic() {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryEventStore::new());
        let pipeline = pipeline_with(Arc::clone(&broker), Arc::clone(&store));

        let event = RawEvent::new(
            "switch.garage",
            EventType::StateChanged,
            Some("off".into()),
            Some("on".into()),
        );
        pipeline.ingest(event).await;

        let published = broker.published("state_changed");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, "switch.garage");
        assert!(store.is_empty());

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.stored, 1);
        assert_eq!(snap.broker_published, 1);
    }

    #[tokio::test]
    async fn test_broker_failure_falls_back_to_storage() {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryEventStore::new());
        let pipeline = pipeline_with(Arc::clone(&broker), Arc::clone(&store));
        broker.set_failing(true);

        let event = RawEvent::new(
            "switch.garage",
            EventType::StateChanged,
            Some("off".into()),
            Some("on".into()),
        );
        let id = event.id;
        pipeline.ingest(event).await;

        assert_eq!(broker.total_published(), 0);
        assert!(store.find(id).is_some());

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.stored, 1);
        assert_eq!(snap.fallback_stored, 1);
        assert_eq!(snap.broker_published, 0);
    }

    #[tokio::test]
    async fn test_fallback_storage_failure_counted_not_retried() {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryEventStore::new());
        let pipeline = pipeline_with(Arc::clone(&broker), Arc::clone(&store));
        broker.set_failing(true);
        store.set_failing(true);

        let event = RawEvent::new(
            "switch.garage",
            EventType::StateChanged,
            Some("off".into()),
            Some("on".into()),
        );
        pipeline.ingest(event).await;

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.stored, 0);
    }

    #[tokio::test]
    async fn test_accounting_identity_holds() {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryEventStore::new());
        let pipeline = pipeline_with(Arc::clone(&broker), Arc::clone(&store));

        for i in 0..50 {
            let event = RawEvent::new(
                "sensor.noise",
                EventType::StateChanged,
                Some(format!("{}", i)),
                Some(format!("{}", i)),
            );
            pipeline.ingest(event).await;
        }

        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.processed, 50);
        assert_eq!(
            snap.processed,
            snap.stored + snap.filtered + snap.sampled_out + snap.failed
        );
    }

    #[tokio::test]
    async fn test_reset_zeroes_counters() {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryEventStore::new());
        let pipeline = pipeline_with(broker, store);

        let event = RawEvent::new(
            "switch.garage",
            EventType::StateChanged,
            Some("off".into()),
            Some("on".into()),
        );
        pipeline.ingest(event).await;
        assert_eq!(pipeline.stats().snapshot().processed, 1);

        pipeline.stats().reset();
        let snap = pipeline.stats().snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.stored, 0);
        assert!((snap.avg_latency_micros - 0.0).abs() < f64::EPSILON);
    }
}
