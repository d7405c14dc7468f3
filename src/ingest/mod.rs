//! Event ingestion and intelligent filtering.
//!
//! The pipeline consumes the platform connector's firehose, classifies each
//! event against fixed policy, down-samples chatty entities, and publishes
//! survivors to the message broker with a synchronous direct-storage
//! fallback that guarantees at-least-once durability.

pub mod broker;
pub mod classifier;
pub mod frequency;
pub mod pipeline;
pub mod store;

pub use broker::{BrokerError, EventBroker, InMemoryBroker, RedisBroker};
pub use classifier::{Disposition, EventClassifier};
pub use frequency::FrequencyTracker;
pub use pipeline::{IngestionPipeline, ProcessingStats, ProcessingStatsSnapshot};
pub use store::{EventStore, InMemoryEventStore, StoreError};
