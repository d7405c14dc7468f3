//! HTTP server setup and service assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::ai::cache::{InMemoryCache, RedisCache, SuggestionCache};
use crate::ai::circuit_breaker::CircuitBreaker;
use crate::ai::providers::{CloudDriver, LocalDriver};
use crate::ai::rate_limit::ProviderRateLimiter;
use crate::ai::router::{HybridRouter, RouterOptions};
use crate::ai::InferenceDriver;
use crate::api;
use crate::config::AppConfig;
use crate::ingest::broker::{EventBroker, InMemoryBroker, RedisBroker};
use crate::ingest::classifier::EventClassifier;
use crate::ingest::frequency::FrequencyTracker;
use crate::ingest::pipeline::{IngestionPipeline, ProcessingStats};
use crate::ingest::store::{EventStore, InMemoryEventStore};
use crate::lifecycle::{ApprovalService, InMemoryAutomationStore};
use crate::logging::OpTimer;
use crate::{log_banner, log_init_step, log_init_warning, log_success};

/// Hearth Core version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application with all routes and middleware.
pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let overall_timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("🔥 Hearth Core v{VERSION}"),
        format!(
            "Local inference: {} | Approval gate: {}",
            if config.local.enabled { "on" } else { "off" },
            if config.lifecycle.require_approval {
                "on"
            } else {
                "off"
            }
        )
    );

    // [1/6] Redis connection, optional with in-memory fallback
    let step_timer = OpTimer::new("server", "redis");
    let redis = if let Some(ref redis_url) = config.redis.url {
        match init_redis(redis_url).await {
            Ok(conn) => {
                log_init_step!(1, 6, "Redis", format!("💾 Connected to {redis_url}"));
                Some(conn)
            }
            Err(e) => {
                log_init_warning!(
                    "Failed to connect to Redis: {}. Using in-memory fallback.",
                    e
                );
                log_init_step!(1, 6, "Redis", "💾 In-memory fallback");
                None
            }
        }
    } else {
        log_init_step!(1, 6, "Redis", "💾 Not configured (in-memory fallback)");
        None
    };
    step_timer.finish();

    // [2/6] Ingestion pipeline
    let step_timer = OpTimer::new("server", "ingestion");
    let broker: Arc<dyn EventBroker> = match &redis {
        Some(conn) => Arc::new(RedisBroker::new(
            conn.clone(),
            config.redis.stream_prefix.clone(),
        )),
        None => Arc::new(InMemoryBroker::new()),
    };
    let event_store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let processing_stats = Arc::new(ProcessingStats::new());
    let pipeline = Arc::new(IngestionPipeline::new(
        EventClassifier::new(&config.sampling),
        FrequencyTracker::new(Duration::from_secs(config.sampling.window_secs)),
        broker,
        event_store,
        Arc::clone(&processing_stats),
        Duration::from_millis(config.ingestion.publish_timeout_ms),
        Duration::from_millis(config.ingestion.fallback_timeout_ms),
    ));
    log_init_step!(
        2,
        6,
        "Ingestion",
        format!(
            "📥 threshold {}/window, sampling {:.0}%",
            config.sampling.high_frequency_threshold,
            config.sampling.sample_fraction * 100.0
        )
    );
    step_timer.finish();

    // [3/6] Inference drivers
    let step_timer = OpTimer::new("server", "drivers");
    if config.cloud.api_key.is_none() {
        log_init_warning!("No cloud API key configured. Cloud suggestions will fail.");
    }
    let cloud: Arc<dyn InferenceDriver> = Arc::new(CloudDriver::new(&config.cloud)?);
    let local: Option<Arc<dyn InferenceDriver>> = if config.local.enabled {
        Some(Arc::new(LocalDriver::new(&config.local)?))
    } else {
        None
    };
    log_init_step!(
        3,
        6,
        "Inference",
        format!(
            "🧠 cloud {} | local {}",
            config.cloud.model,
            if config.local.enabled {
                config.local.model.as_str()
            } else {
                "disabled"
            }
        )
    );
    step_timer.finish();

    // [4/6] Hybrid router with resilience wrapping
    let step_timer = OpTimer::new("server", "router");
    let cache: Arc<dyn SuggestionCache> = match &redis {
        Some(conn) => Arc::new(RedisCache::new(
            conn.clone(),
            config.redis.cache_prefix.clone(),
        )),
        None => Arc::new(InMemoryCache::new()),
    };
    let router = Arc::new(HybridRouter::new(
        cache,
        cloud,
        local,
        ProviderRateLimiter::new(
            config.rate_limit.requests_per_minute,
            config.rate_limit.burst,
            config.rate_limit.max_concurrent,
        ),
        CircuitBreaker::new(
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.success_threshold,
            Duration::from_secs(config.circuit_breaker.cooldown_secs),
        ),
        RouterOptions {
            local_first: config.routing.local_first,
            cache_ttl: Duration::from_secs(config.routing.cache_ttl_secs),
            provider_timeout: Duration::from_secs(config.routing.provider_timeout_secs),
            max_tokens: config.routing.max_tokens,
            temperature: config.routing.temperature,
        },
    ));
    let routing_metrics = router.metrics();
    log_init_step!(
        4,
        6,
        "Hybrid Router",
        format!(
            "🔀 {} req/min, {} concurrent",
            config.rate_limit.requests_per_minute, config.rate_limit.max_concurrent
        )
    );
    step_timer.finish();

    // [5/6] Lifecycle approval service and inactivity sweep
    let step_timer = OpTimer::new("server", "lifecycle");
    let approvals = Arc::new(ApprovalService::new(
        Arc::new(InMemoryAutomationStore::new()),
        config.lifecycle.require_approval,
        chrono::Duration::days(config.lifecycle.inactivity_window_days),
    ));
    spawn_inactivity_sweep(
        Arc::clone(&approvals),
        Duration::from_secs(config.lifecycle.sweep_interval_secs),
    );
    log_init_step!(
        5,
        6,
        "Lifecycle",
        format!(
            "📋 sweep every {}s, inactivity window {}d",
            config.lifecycle.sweep_interval_secs, config.lifecycle.inactivity_window_days
        )
    );
    step_timer.finish();

    // Create app state
    let state = AppState {
        config: Arc::new(config),
        pipeline,
        processing_stats,
        router,
        routing_metrics,
        approvals,
        redis_connected: redis.is_some(),
    };

    // [6/6] Build router with middleware
    let step_timer = OpTimer::new("server", "http_router");
    let app = api::create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    log_init_step!(6, 6, "Router", "🌐 Routes + middleware configured");
    step_timer.finish();

    overall_timer.finish();
    log_success!("Hearth Core server created successfully");
    tracing::info!("");

    Ok(app)
}

/// Initialize Redis connection.
async fn init_redis(url: &str) -> anyhow::Result<redis::aio::ConnectionManager> {
    let client = redis::Client::open(url)?;
    let conn = redis::aio::ConnectionManager::new(client).await?;
    Ok(conn)
}

/// Periodically mark long-idle active automations inactive.
fn spawn_inactivity_sweep(approvals: Arc<ApprovalService>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let timer = OpTimer::new("lifecycle", "inactivity_sweep");
            match approvals.sweep_inactive("inactivity-sweep").await {
                Ok(swept) => {
                    if swept > 0 {
                        tracing::info!(swept, "Inactivity sweep transitioned automations");
                    }
                    timer.finish();
                }
                Err(e) => {
                    timer.finish_with_result::<(), _>(Err(&e));
                }
            }
        }
    });
}
