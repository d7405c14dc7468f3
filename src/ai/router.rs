//! Hybrid suggestion router.
//!
//! Routes each suggestion request to the cheapest path that can serve it:
//! the result cache, the local model when the local-first policy and its
//! confidence estimate allow, otherwise the cloud provider behind the rate
//! limiter and circuit breaker. Provider failures are retried according to
//! their error classification; cache failures are logged and degraded to a
//! miss so the cache backend can never take the suggestion path down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::ai::cache::SuggestionCache;
use crate::ai::circuit_breaker::{CircuitBreaker, ErrorClass};
use crate::ai::rate_limit::ProviderRateLimiter;
use crate::ai::{
    AiSuggestion, AutomationContext, InferenceDriver, InferenceRequest, ProviderError,
    SuggestionStrategy, UserPreferences,
};

/// Suggestion generation failure, surfaced to the caller only after local
/// recovery (fallbacks, retries) is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Rate limiter refused the call; no capacity right now.
    #[error("suggestion capacity exhausted, try again")]
    CapacityExhausted,
    /// Circuit breaker is open; the provider is failing.
    #[error("suggestion provider unavailable (circuit open), try again")]
    CircuitOpen,
    /// Provider call failed after classification-driven retries.
    #[error("suggestion unavailable ({}): {source}", class.as_str())]
    Unavailable {
        /// Failure classification, for diagnostics.
        class: ErrorClass,
        /// The final provider error.
        source: ProviderError,
    },
}

/// Routing-strategy counters, exposed on the stats endpoint.
#[derive(Debug, Default)]
pub struct RoutingMetrics {
    local: AtomicU64,
    cloud: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time view of [`RoutingMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct RoutingMetricsSnapshot {
    /// Suggestions generated locally.
    pub local: u64,
    /// Suggestions generated by the cloud provider.
    pub cloud: u64,
    /// Suggestions served from cache.
    pub cache_hits: u64,
    /// Requests that failed after all recovery.
    pub failures: u64,
}

impl RoutingMetrics {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> RoutingMetricsSnapshot {
        RoutingMetricsSnapshot {
            local: self.local.load(Ordering::Relaxed),
            cloud: self.cloud.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Tunables for the router, derived from configuration.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Prefer local inference when confidence permits, even if the caller's
    /// preferences do not ask for it.
    pub local_first: bool,
    /// Cache write-through TTL.
    pub cache_ttl: Duration,
    /// Hard timeout on each provider attempt.
    pub provider_timeout: Duration,
    /// Generation size bound passed to providers.
    pub max_tokens: u32,
    /// Temperature-like parameter passed to providers.
    pub temperature: f32,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            local_first: false,
            cache_ttl: Duration::from_secs(1800),
            provider_timeout: Duration::from_secs(60),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// Local-vs-cloud-vs-cache router with resilience wrapping.
pub struct HybridRouter {
    cache: Arc<dyn SuggestionCache>,
    cloud: Arc<dyn InferenceDriver>,
    local: Option<Arc<dyn InferenceDriver>>,
    limiter: ProviderRateLimiter,
    breaker: CircuitBreaker,
    metrics: Arc<RoutingMetrics>,
    options: RouterOptions,
}

impl std::fmt::Debug for HybridRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRouter")
            .field("local_available", &self.local.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl HybridRouter {
    /// Assemble a router.
    #[must_use]
    pub fn new(
        cache: Arc<dyn SuggestionCache>,
        cloud: Arc<dyn InferenceDriver>,
        local: Option<Arc<dyn InferenceDriver>>,
        limiter: ProviderRateLimiter,
        breaker: CircuitBreaker,
        options: RouterOptions,
    ) -> Self {
        Self {
            cache,
            cloud,
            local,
            limiter,
            breaker,
            metrics: Arc::new(RoutingMetrics::default()),
            options,
        }
    }

    /// The router's metrics handle.
    #[must_use]
    pub fn metrics(&self) -> Arc<RoutingMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The circuit breaker guarding the cloud provider.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Generate a suggestion for a context.
    ///
    /// Identical contexts within the cache TTL cost at most one inference.
    /// Cancelling the returned future releases any held rate-limiter permit.
    pub async fn generate_suggestion(
        &self,
        context: &AutomationContext,
        preferences: &UserPreferences,
    ) -> Result<AiSuggestion, RouterError> {
        let fingerprint = context.fingerprint();

        match self.cache.get(&fingerprint).await {
            Ok(Some(mut suggestion)) => {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(fingerprint = %fingerprint, "Suggestion cache hit");
                // Report how this response was served, not how the cached
                // entry was originally generated.
                suggestion.strategy = SuggestionStrategy::Cache;
                return Ok(suggestion);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Suggestion cache read failed, treating as miss");
            }
        }

        let request = InferenceRequest {
            fingerprint: fingerprint.clone(),
            prompt: build_prompt(context),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let suggestion = match self.try_local(context, preferences, &request).await {
            Some(suggestion) => suggestion,
            None => self.generate_cloud(request).await.inspect_err(|_| {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            })?,
        };

        if let Err(e) = self
            .cache
            .set(&fingerprint, &suggestion, self.options.cache_ttl)
            .await
        {
            tracing::warn!(error = %e, "Suggestion cache write failed");
        }

        Ok(suggestion)
    }

    /// Attempt local inference when policy, availability, and confidence
    /// permit. Local failures are not fatal; the caller falls through to the
    /// cloud path.
    async fn try_local(
        &self,
        context: &AutomationContext,
        preferences: &UserPreferences,
        request: &InferenceRequest,
    ) -> Option<AiSuggestion> {
        if !(self.options.local_first || preferences.prefer_local) {
            return None;
        }
        let local = self.local.as_ref()?;

        let confidence = local.confidence(context);
        if confidence < preferences.local_confidence_threshold {
            tracing::debug!(
                confidence,
                threshold = preferences.local_confidence_threshold,
                "Local confidence below threshold, routing to cloud"
            );
            return None;
        }

        let attempt = tokio::time::timeout(
            self.options.provider_timeout,
            local.generate(request.clone()),
        )
        .await;

        match attempt {
            Ok(Ok(response)) => {
                self.metrics.local.fetch_add(1, Ordering::Relaxed);
                tracing::info!(fingerprint = %request.fingerprint, "Suggestion generated locally");
                Some(AiSuggestion::from_model_output(
                    &response.output,
                    SuggestionStrategy::Local,
                ))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Local inference failed, falling back to cloud");
                None
            }
            Err(_) => {
                tracing::warn!("Local inference timed out, falling back to cloud");
                None
            }
        }
    }

    /// Cloud path: circuit breaker, rate limiter, classification-driven
    /// retries. The rate-limiter permit is held for the whole attempt
    /// sequence and released on return or cancellation.
    async fn generate_cloud(&self, request: InferenceRequest) -> Result<AiSuggestion, RouterError> {
        if !self.breaker.is_request_allowed() {
            tracing::warn!("Cloud provider circuit open, failing fast");
            return Err(RouterError::CircuitOpen);
        }

        let _permit = self
            .limiter
            .try_acquire()
            .ok_or(RouterError::CapacityExhausted)?;

        let mut attempt: u32 = 0;
        loop {
            let call = tokio::time::timeout(
                self.options.provider_timeout,
                self.cloud.generate(request.clone()),
            )
            .await;

            let error = match call {
                Ok(Ok(response)) => {
                    self.breaker.record_success();
                    self.metrics.cloud.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        fingerprint = %request.fingerprint,
                        prompt_tokens = response.prompt_tokens,
                        completion_tokens = response.completion_tokens,
                        "Suggestion generated by cloud provider"
                    );
                    return Ok(AiSuggestion::from_model_output(
                        &response.output,
                        SuggestionStrategy::Cloud,
                    ));
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Network("provider call timed out".to_string()),
            };

            let policy = self.breaker.handle_error(&error);
            let class = ErrorClass::of(&error);

            if !policy.retryable || attempt >= policy.max_retries {
                tracing::warn!(
                    class = class.as_str(),
                    attempt,
                    error = %error,
                    "Cloud provider call failed, retries exhausted"
                );
                return Err(RouterError::Unavailable {
                    class,
                    source: error,
                });
            }

            attempt += 1;
            tracing::debug!(
                class = class.as_str(),
                attempt,
                backoff_ms = policy.backoff.as_millis() as u64,
                "Retrying cloud provider call"
            );
            tokio::time::sleep(policy.backoff).await;

            if !self.breaker.is_request_allowed() {
                return Err(RouterError::CircuitOpen);
            }
        }
    }
}

/// Render a context into the provider prompt.
fn build_prompt(context: &AutomationContext) -> String {
    use std::fmt::Write;

    let mut prompt = format!(
        "Suggest a home automation for the '{}' pattern involving entities: {}.\n",
        context.pattern_type,
        context.entity_ids.join(", ")
    );

    if !context.recent_events.is_empty() {
        prompt.push_str("Recent supporting events:\n");
        for event in &context.recent_events {
            let _ = writeln!(
                prompt,
                "- {} {} -> {}",
                event.entity_id,
                event.event_type,
                event.new_state.as_deref().unwrap_or("?")
            );
        }
    }

    prompt
}
