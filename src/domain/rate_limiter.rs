//! Per-channel token-bucket admission gate.
//!
//! [`ChannelRateLimiter`] wraps a keyed `governor` limiter. Every session
//! is charged against its *rate-limit channel*; sessions sharing a channel
//! share one bucket, which gives per-owner quotas across connections.
//!
//! A denied check is not an error: the caller backs off for the returned
//! wait and retries. Nothing is dropped for rate reasons.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Bucket capacity: the most deliveries allowed back to back.
    pub burst: NonZeroU32,
    /// Tokens replenished per second, one every `1 / refill_per_second`.
    pub refill_per_second: NonZeroU32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: NonZeroU32::new(30).unwrap_or(NonZeroU32::MIN),
            refill_per_second: NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// Keyed token bucket shared by all sessions of a hub.
pub struct ChannelRateLimiter {
    limiter: DefaultKeyedRateLimiter<Arc<str>>,
    clock: DefaultClock,
    config: RateLimitConfig,
}

impl ChannelRateLimiter {
    /// Creates a limiter where every channel starts with a full bucket.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(config.refill_per_second).allow_burst(config.burst);
        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
            config,
        }
    }

    /// Consumes one token from `channel`'s bucket.
    ///
    /// Callers build the key once per session; a check never allocates.
    ///
    /// # Errors
    ///
    /// Returns the time until the next token becomes available when the
    /// bucket is empty. The token is not consumed in that case.
    pub fn check(&self, channel: &Arc<str>) -> Result<(), Duration> {
        self.limiter
            .check_key(channel)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Forgets channels whose buckets have refilled completely.
    ///
    /// A forgotten channel behaves exactly like a full bucket, so this only
    /// reclaims memory for connections that went away.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of channels currently tracked.
    #[must_use]
    pub fn tracked_channels(&self) -> usize {
        self.limiter.len()
    }

    /// Returns the bucket parameters.
    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }
}

impl fmt::Debug for ChannelRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRateLimiter")
            .field("config", &self.config)
            .field("tracked_channels", &self.limiter.len())
            .finish()
    }
}
