//! Per-source token-bucket admission control.
//!
//! Each source key (the client address) gets its own `governor` direct
//! limiter, created lazily on first sight. Buckets that stay idle longer than
//! the configured timeout are evicted by [`RateLimiter::evict_idle`], which a
//! background task runs on an interval.

use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RateLimitConfig;

type Bucket<C> = governor::RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

struct Visitor<C: Clock> {
    bucket: Bucket<C>,
    last_seen: C::Instant,
}

/// Rate limiter keyed by request source.
pub struct RateLimiter<C: Clock = DefaultClock> {
    quota: Quota,
    idle_timeout: Duration,
    clock: C,
    visitors: Mutex<HashMap<String, Visitor<C>>>,
}

impl RateLimiter<DefaultClock> {
    /// Build a limiter from configuration using the monotonic system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if `rps` is not positive or `burst` is zero.
    pub fn from_config(config: &RateLimitConfig) -> anyhow::Result<Self> {
        Self::with_clock(
            config.rps,
            config.burst,
            Duration::from_secs(config.idle_timeout_secs),
            DefaultClock::default(),
        )
    }
}

impl<C: Clock + Clone> RateLimiter<C> {
    /// Build a limiter with `rps` tokens per second (may be fractional) and a
    /// bucket capacity of `burst`.
    pub fn with_clock(rps: f64, burst: u32, idle_timeout: Duration, clock: C) -> anyhow::Result<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            anyhow::bail!("rate limit rps must be positive (got {rps})");
        }
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| anyhow::anyhow!("rate limit burst must be at least 1"))?;
        let quota = Quota::with_period(Duration::from_secs_f64(1.0 / rps))
            .ok_or_else(|| anyhow::anyhow!("rate limit rps {rps} is too large"))?
            .allow_burst(burst);

        Ok(Self {
            quota,
            idle_timeout,
            clock,
            visitors: Mutex::new(HashMap::new()),
        })
    }

    /// Take one token from the source's bucket. Never blocks.
    pub fn allow(&self, source: &str) -> bool {
        let now = self.clock.now();
        let mut visitors = self.visitors.lock();
        if let Some(visitor) = visitors.get_mut(source) {
            visitor.last_seen = now;
            return visitor.bucket.check().is_ok();
        }
        let visitor = Visitor {
            bucket: governor::RateLimiter::direct_with_clock(self.quota, self.clock.clone()),
            last_seen: now,
        };
        let allowed = visitor.bucket.check().is_ok();
        visitors.insert(source.to_string(), visitor);
        allowed
    }

    /// Drop buckets not seen for longer than the idle timeout. Returns the
    /// number evicted.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let mut visitors = self.visitors.lock();
        let before = visitors.len();
        visitors.retain(|_, visitor| {
            let idle: Duration = now.duration_since(visitor.last_seen).into();
            idle <= self.idle_timeout
        });
        before - visitors.len()
    }

    /// Number of tracked sources.
    pub fn tracked(&self) -> usize {
        self.visitors.lock().len()
    }
}

impl<C> RateLimiter<C>
where
    C: Clock + Clone + Send + Sync + 'static,
    C::Instant: Send + Sync,
{
    /// Run [`evict_idle`](Self::evict_idle) every `interval` until the handle
    /// is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    debug!(evicted, remaining = limiter.tracked(), "Evicted idle rate limit buckets");
                }
            }
        })
    }
}
