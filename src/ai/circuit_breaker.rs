//! Circuit breaker and provider error classification.
//!
//! Protects the suggestion path from a failing inference provider. Tracks
//! consecutive failures and transitions between Closed, Open, and HalfOpen;
//! all transitions happen under one lock so concurrent callers can never
//! wedge the breaker with a lost update.
//!
//! # States
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: too many consecutive failures, fail fast
//! - **HalfOpen**: cooldown elapsed, trial requests allowed
//!
//! Error classification is independent of circuit state: every
//! [`ProviderError`] maps to an [`ErrorClass`] whose [`RetryPolicy`] tells
//! the caller whether and how to retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::ai::ProviderError;

/// Retryability class of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Provider-side quota exhaustion.
    RateLimited,
    /// Network failure or timeout.
    Network,
    /// Provider server error (5xx).
    Server,
    /// Authentication/bad request (4xx).
    Request,
    /// Anything else.
    Unclassified,
}

impl ErrorClass {
    /// Classify a provider error.
    #[must_use]
    pub fn of(error: &ProviderError) -> Self {
        match error {
            ProviderError::RateLimited(_) => Self::RateLimited,
            ProviderError::Network(_) => Self::Network,
            ProviderError::Server { .. } => Self::Server,
            ProviderError::Request { .. } => Self::Request,
            ProviderError::Other(_) => Self::Unclassified,
        }
    }

    /// Retry policy for this class.
    #[must_use]
    pub const fn retry_policy(self) -> RetryPolicy {
        match self {
            Self::RateLimited => RetryPolicy {
                retryable: true,
                backoff: Duration::from_secs(60),
                max_retries: 3,
            },
            Self::Network => RetryPolicy {
                retryable: true,
                backoff: Duration::from_secs(1),
                max_retries: 5,
            },
            Self::Server => RetryPolicy {
                retryable: true,
                backoff: Duration::from_secs(2),
                max_retries: 3,
            },
            Self::Request => RetryPolicy {
                retryable: false,
                backoff: Duration::ZERO,
                max_retries: 0,
            },
            Self::Unclassified => RetryPolicy {
                retryable: true,
                backoff: Duration::from_secs(5),
                max_retries: 1,
            },
        }
    }

    /// String form for logs and diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Network => "network",
            Self::Server => "server",
            Self::Request => "request",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Whether and how a failed call should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whether a retry can help at all.
    pub retryable: bool,
    /// Base delay before the next attempt.
    pub backoff: Duration,
    /// Attempts beyond the first.
    pub max_retries: u32,
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all requests pass through.
    Closed,
    /// Too many failures, fail fast without attempting the request.
    Open,
    /// Testing recovery, limited requests allowed.
    HalfOpen,
}

impl CircuitState {
    /// String form for logs and the stats endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding outbound provider calls.
///
/// Thread-safe; share across tasks with [`Clone`] (internally `Arc`).
#[derive(Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    cooldown: Duration,
    inner: Arc<RwLock<BreakerInner>>,
}

impl CircuitBreaker {
    /// Create a breaker.
    ///
    /// `failure_threshold` consecutive failures open the circuit;
    /// after `cooldown` it allows trial requests, and `success_threshold`
    /// consecutive successes close it again.
    #[must_use]
    pub fn new(failure_threshold: u32, success_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            cooldown,
            inner: Arc::new(RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
        }
    }

    /// Whether a request may proceed. An Open breaker whose cooldown has
    /// elapsed transitions to HalfOpen here.
    #[must_use]
    pub fn is_request_allowed(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed());
                if elapsed.is_some_and(|e| e >= self.cooldown) {
                    tracing::info!(
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit breaker transitioning to half-open"
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Resets the failure streak and, in HalfOpen,
    /// advances toward Closed.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    tracing::info!("Circuit breaker closing after successful recovery trial");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {
                inner.failure_count = 0;
            }
        }
    }

    /// Record a failed call and return the retry policy for its class.
    ///
    /// Updates the consecutive-failure count and circuit state atomically;
    /// a failure in HalfOpen reopens the circuit immediately.
    pub fn handle_error(&self, error: &ProviderError) -> RetryPolicy {
        let class = ErrorClass::of(error);
        let policy = class.retry_policy();

        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                tracing::debug!(
                    class = class.as_str(),
                    failure_count = inner.failure_count,
                    failure_threshold = self.failure_threshold,
                    "Provider call failed"
                );
                if inner.failure_count >= self.failure_threshold {
                    tracing::warn!(
                        failure_count = inner.failure_count,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    class = class.as_str(),
                    "Circuit breaker reopening after half-open failure"
                );
                inner.state = CircuitState::Open;
                inner.failure_count = self.failure_threshold;
                inner.success_count = 0;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }

        policy
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.read().failure_count
    }

    /// Force the breaker closed. Manual recovery and tests only.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at = None;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CircuitBreaker")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("cooldown", &self.cooldown)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> ProviderError {
        ProviderError::Network("connection refused".into())
    }

    fn auth_error() -> ProviderError {
        ProviderError::Request {
            status: 401,
            message: "bad key".into(),
        }
    }

    #[test]
    fn test_classification_table() {
        let cases = [
            (ProviderError::RateLimited("quota".into()), true, 60, 3),
            (network_error(), true, 1, 5),
            (
                ProviderError::Server {
                    status: 503,
                    message: "overloaded".into(),
                },
                true,
                2,
                3,
            ),
            (auth_error(), false, 0, 0),
            (ProviderError::Other("weird".into()), true, 5, 1),
        ];

        for (error, retryable, backoff_secs, max_retries) in cases {
            let policy = ErrorClass::of(&error).retry_policy();
            assert_eq!(policy.retryable, retryable, "{error}");
            assert_eq!(policy.backoff, Duration::from_secs(backoff_secs), "{error}");
            assert_eq!(policy.max_retries, max_retries, "{error}");
        }
    }

    #[test]
    fn test_initial_state_closed() {
        let breaker = CircuitBreaker::new(10, 3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_request_allowed());
    }

    #[test]
    fn test_opens_after_exact_threshold() {
        let breaker = CircuitBreaker::new(3, 3, Duration::from_secs(60));

        breaker.handle_error(&network_error());
        breaker.handle_error(&network_error());
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.handle_error(&network_error());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_request_allowed());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(3, 3, Duration::from_secs(60));

        breaker.handle_error(&network_error());
        breaker.handle_error(&network_error());
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        breaker.handle_error(&network_error());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_non_retryable_error_still_counts_toward_opening() {
        let breaker = CircuitBreaker::new(2, 3, Duration::from_secs(60));

        let policy = breaker.handle_error(&auth_error());
        assert!(!policy.retryable);
        breaker.handle_error(&auth_error());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_cooldown_then_closes() {
        let breaker = CircuitBreaker::new(2, 3, Duration::ZERO);

        breaker.handle_error(&network_error());
        breaker.handle_error(&network_error());
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.is_request_allowed());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(2, 3, Duration::ZERO);

        breaker.handle_error(&network_error());
        breaker.handle_error(&network_error());
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.is_request_allowed());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.handle_error(&network_error());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset() {
        let breaker = CircuitBreaker::new(1, 3, Duration::from_secs(60));
        breaker.handle_error(&network_error());
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_request_allowed());
    }
}
