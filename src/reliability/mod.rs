//! Reliability and security primitives shared across the service:
//! admission control, outbound retries and constant-time comparisons.

pub mod rate_limit;
pub mod retry;
pub mod security;

pub use rate_limit::RateLimiter;
pub use retry::{RetryConfig, retry_anyhow};
