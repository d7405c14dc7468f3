//! Provider rate limiting.
//!
//! Combines a governor token bucket (request rate) with a semaphore
//! (in-flight concurrency). Acquisition is non-blocking: a caller either
//! gets a [`RateLimitPermit`] immediately or is told to come back later.
//! The permit releases its concurrency slot on drop, so a cancelled
//! suggestion request can never leak capacity.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Direct (unkeyed) governor limiter.
type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token-bucket plus concurrency gate in front of one provider.
pub struct ProviderRateLimiter {
    bucket: Bucket,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl std::fmt::Debug for ProviderRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRateLimiter")
            .field("max_concurrent", &self.max_concurrent)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// Held capacity for one in-flight provider call.
///
/// Dropping the permit returns the concurrency slot. Rate-bucket tokens are
/// consumed at acquisition and refill on their own.
#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: OwnedSemaphorePermit,
}

impl ProviderRateLimiter {
    /// Create a limiter allowing `requests_per_minute` (with `burst`
    /// headroom) and at most `max_concurrent` calls in flight.
    ///
    /// # Panics
    ///
    /// Panics if any argument is zero; configuration validation rejects
    /// those values before a limiter is built.
    #[must_use]
    pub fn new(requests_per_minute: u32, burst: u32, max_concurrent: usize) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(requests_per_minute).expect("validated: requests_per_minute > 0"),
        )
        .allow_burst(NonZeroU32::new(burst).expect("validated: burst > 0"));

        assert!(max_concurrent > 0, "validated: max_concurrent > 0");

        Self {
            bucket: RateLimiter::direct(quota),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Try to acquire capacity for one call without blocking.
    ///
    /// Returns `None` when either the rate bucket or the concurrency gate is
    /// exhausted. A concurrency slot consumed here is only released when the
    /// returned permit drops; the rate token is not refunded on failure of
    /// the guarded call, which is what makes this a rate limit rather than a
    /// success limit.
    #[must_use]
    pub fn try_acquire(&self) -> Option<RateLimitPermit> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().ok()?;

        match self.bucket.check() {
            Ok(()) => Some(RateLimitPermit { _permit: permit }),
            Err(_) => {
                drop(permit);
                None
            }
        }
    }

    /// Concurrency slots currently free.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured concurrency bound.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
