//! AI suggestion generation: resilience and hybrid routing.
//!
//! This module wraps every call to a local or remote inference provider with
//! rate limiting, circuit breaking, and result caching, and decides per
//! request whether to serve from cache, the local model, or the cloud
//! provider.
//!
//! # Overview
//!
//! The [`InferenceDriver`] trait defines the provider interface; the
//! [`router::HybridRouter`] builds on top of drivers, a
//! [`cache::SuggestionCache`], a [`rate_limit::ProviderRateLimiter`], and a
//! [`circuit_breaker::CircuitBreaker`] to make provider outages degrade
//! gracefully instead of cascading.

pub mod cache;
pub mod circuit_breaker;
pub mod providers;
pub mod rate_limit;
pub mod router;

pub use cache::{CacheError, InMemoryCache, NoopCache, RedisCache, SuggestionCache};
pub use circuit_breaker::{CircuitBreaker, CircuitState, ErrorClass, RetryPolicy};
pub use providers::{CloudDriver, LocalDriver};
pub use rate_limit::{ProviderRateLimiter, RateLimitPermit};
pub use router::{
    HybridRouter, RouterError, RouterOptions, RoutingMetrics, RoutingMetricsSnapshot,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::events::EventType;

/// Condensed view of a recent event carried inside an [`AutomationContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    /// Entity the event belongs to.
    pub entity_id: String,
    /// Kind of event.
    pub event_type: EventType,
    /// Resulting state, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    /// When it happened.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Fingerprint-able bundle handed to the hybrid router by pattern analysis.
///
/// Two contexts with identical fingerprints are treated as the same cache
/// key, which is what bounds inference work to at most one computation per
/// distinct context within the cache TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationContext {
    /// User the suggestion is for.
    pub user_id: String,
    /// Detected pattern kind, e.g. `time_of_day` or `co_occurrence`.
    pub pattern_type: String,
    /// Entities participating in the pattern.
    pub entity_ids: Vec<String>,
    /// Recent supporting events.
    pub recent_events: Vec<EventSummary>,
}

impl AutomationContext {
    /// Deterministic fingerprint over the context's identifying fields.
    ///
    /// Entity ids are sorted so fingerprints are order-independent; event
    /// summaries participate through their entity/state pairs but not their
    /// timestamps, so a re-analysis of the same pattern minutes later still
    /// hits the cache.
    #[must_use]
    pub fn fingerprint(&self) -> ContextFingerprint {
        let mut entities = self.entity_ids.clone();
        entities.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(self.user_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.pattern_type.as_bytes());
        for entity in &entities {
            hasher.update([0]);
            hasher.update(entity.as_bytes());
        }
        for event in &self.recent_events {
            hasher.update([1]);
            hasher.update(event.entity_id.as_bytes());
            hasher.update([0]);
            hasher.update(event.event_type.as_str().as_bytes());
            if let Some(state) = &event.new_state {
                hasher.update([0]);
                hasher.update(state.as_bytes());
            }
        }

        ContextFingerprint(hex::encode(hasher.finalize()))
    }
}

/// Hex-encoded SHA-256 fingerprint of an [`AutomationContext`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextFingerprint(pub String);

impl std::fmt::Display for ContextFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user routing preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Prefer on-device inference when confidence permits.
    pub prefer_local: bool,
    /// Minimum local confidence estimate required to route locally.
    pub local_confidence_threshold: f64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            prefer_local: false,
            local_confidence_threshold: 0.7,
        }
    }
}

/// Which path produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStrategy {
    /// On-device model.
    Local,
    /// Remote provider.
    Cloud,
    /// Served from the result cache.
    Cache,
}

impl SuggestionStrategy {
    /// String form for logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
            Self::Cache => "cache",
        }
    }
}

/// Append-only audit note attached to a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditNote {
    /// What happened.
    pub note: String,
    /// When it was recorded.
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A generated automation suggestion.
///
/// Immutable after creation except for [`AiSuggestion::annotate`], which
/// appends audit notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSuggestion {
    /// Suggestion identifier.
    pub id: Uuid,
    /// Suggestion kind, e.g. `new_automation` or `schedule_adjustment`.
    pub suggestion_type: String,
    /// Structured automation definition produced by the model.
    pub automation: serde_json::Value,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    /// Safety assessment in `[0, 1]`.
    pub safety_score: f64,
    /// Which path generated this suggestion.
    pub strategy: SuggestionStrategy,
    /// When it was generated.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Append-only audit trail.
    #[serde(default)]
    pub audit: Vec<AuditNote>,
}

impl AiSuggestion {
    /// Build a suggestion from a model's structured output.
    ///
    /// Missing or out-of-range scores are clamped into `[0, 1]`; a missing
    /// confidence defaults to 0.5 and a missing safety score to 0.0 so an
    /// unscored suggestion is never treated as safe.
    #[must_use]
    pub fn from_model_output(output: &serde_json::Value, strategy: SuggestionStrategy) -> Self {
        let suggestion_type = output
            .get("suggestion_type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("new_automation")
            .to_string();
        let automation = output
            .get("automation")
            .cloned()
            .unwrap_or_else(|| output.clone());
        let confidence = output
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        let safety_score = output
            .get("safety_score")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Self {
            id: Uuid::new_v4(),
            suggestion_type,
            automation,
            confidence,
            safety_score,
            strategy,
            created_at: chrono::Utc::now(),
            audit: Vec::new(),
        }
    }

    /// Append an audit note.
    pub fn annotate(&mut self, note: impl Into<String>) {
        self.audit.push(AuditNote {
            note: note.into(),
            at: chrono::Utc::now(),
        });
    }
}

/// Typed failure from an inference provider call.
///
/// HTTP drivers map their transport and status errors into these classes;
/// retry and circuit-breaker decisions are pure functions over the class,
/// independent of any provider's error shape.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the request due to quota/rate limits.
    #[error("provider rate limited: {0}")]
    RateLimited(String),
    /// Network failure or timeout reaching the provider.
    #[error("network error: {0}")]
    Network(String),
    /// Provider-side server error (5xx).
    #[error("provider server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Provider error body, truncated.
        message: String,
    },
    /// Authentication or bad-request error (4xx). Not retryable.
    #[error("request rejected ({status}): {message}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Provider error body, truncated.
        message: String,
    },
    /// Anything the driver could not classify.
    #[error("{0}")]
    Other(String),
}

/// Request sent to an inference provider.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    /// Fingerprint of the originating context, for idempotency and logs.
    pub fingerprint: ContextFingerprint,
    /// Prompt/feature payload.
    pub prompt: String,
    /// Generation size bound.
    pub max_tokens: u32,
    /// Temperature-like sampling parameter.
    pub temperature: f32,
}

/// Raw provider response plus usage accounting.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceResponse {
    /// Structured model output.
    pub output: serde_json::Value,
    /// Prompt tokens consumed.
    pub prompt_tokens: u32,
    /// Completion tokens consumed.
    pub completion_tokens: u32,
}

/// A local or remote inference provider.
#[async_trait]
pub trait InferenceDriver: Send + Sync {
    /// Run one generation.
    async fn generate(&self, req: InferenceRequest) -> Result<InferenceResponse, ProviderError>;

    /// Estimated confidence that this driver can handle the context.
    ///
    /// Cloud drivers default to full confidence; the local driver estimates
    /// from the pattern shape so the router can decide local-vs-cloud.
    fn confidence(&self, _context: &AutomationContext) -> f64 {
        1.0
    }

    /// Driver name for logs.
    fn name(&self) -> &'static str;
}
