//! Hearth Core - Smart-Home AI Assistant Service
//!
//! This crate provides the core service for the Hearth smart-home assistant:
//! it ingests the platform's raw event stream, filters it down to the events
//! worth learning from, generates automation suggestions through a hybrid
//! local/cloud AI layer, and manages the lifecycle of the automations those
//! suggestions become.
//!
//! - **Ingestion**: importance classification, high-frequency down-sampling,
//!   broker publish with direct-storage fallback
//! - **AI routing**: cache, local-model, and cloud paths behind a rate
//!   limiter and an error-classifying circuit breaker
//! - **Lifecycle**: versioned automation records gated by single-flight
//!   approval workflows, with emergency stop
//!
//! # Architecture
//!
//! - [`config`]: Configuration management and environment loading
//! - [`events`]: The raw platform event model
//! - [`ingest`]: Event classification, sampling, and the ingestion pipeline
//! - [`ai`]: Inference drivers, resilience wrapping, and hybrid routing
//! - [`lifecycle`]: Automation state machine and approval workflows
//! - [`api`]: Operator-facing HTTP endpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth_core::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8090").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod ai;
pub mod api;
pub mod config;
pub mod events;
pub mod ingest;
pub mod lifecycle;
pub mod logging;
pub mod server;

use std::sync::Arc;

use ai::router::{HybridRouter, RoutingMetrics};
use config::AppConfig;
use ingest::pipeline::{IngestionPipeline, ProcessingStats};
use lifecycle::ApprovalService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Event ingestion pipeline, driven by the platform connector.
    pub pipeline: Arc<IngestionPipeline>,
    /// Ingestion counters, shared with the pipeline.
    pub processing_stats: Arc<ProcessingStats>,
    /// Hybrid suggestion router.
    pub router: Arc<HybridRouter>,
    /// Routing counters, shared with the router.
    pub routing_metrics: Arc<RoutingMetrics>,
    /// Approval workflow service.
    pub approvals: Arc<ApprovalService>,
    /// Whether the Redis backends are wired in.
    pub redis_connected: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("pipeline", &self.pipeline)
            .field("router", &self.router)
            .field("redis_connected", &self.redis_connected)
            .finish()
    }
}
