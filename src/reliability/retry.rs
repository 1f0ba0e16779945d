//! Retry with exponential backoff for outbound calls.
//!
//! Used by the mail relay notifier; the relay is best-effort, so the number
//! of attempts is kept small.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::network()
    }
}

impl RetryConfig {
    /// Settings for calls to a remote HTTP service.
    #[must_use]
    pub fn network() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn build_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_factor(self.factor)
            .with_jitter()
    }
}

/// Retry an operation returning `anyhow::Result` while its error looks
/// transient.
pub async fn retry_anyhow<F, Fut, T>(
    config: RetryConfig,
    operation_name: &str,
    operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let backoff = config.build_backoff();
    let max_retries = config.max_retries;

    let mut attempt = 0u32;
    let notify = |err: &anyhow::Error, dur: Duration| {
        attempt += 1;
        warn!(
            operation = %operation_name,
            attempt,
            max_retries,
            next_delay_ms = dur.as_millis() as u64,
            error = %err,
            "Operation failed, will retry"
        );
    };

    operation
        .retry(backoff)
        .when(is_transient_error)
        .notify(notify)
        .await
}

/// Whether an error is worth retrying: connection failures, timeouts,
/// retryable HTTP statuses and transient SMTP replies.
pub fn is_transient_error(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        if let Some(err) = cause.downcast_ref::<reqwest::Error>() {
            if err.is_timeout() || err.is_connect() {
                debug!("Transient error detected: connection issue");
                return true;
            }
            if let Some(status) = err.status() {
                return is_retryable_status(status.as_u16());
            }
        }
        if let Some(err) = cause.downcast_ref::<lettre::transport::smtp::Error>()
            && (err.is_transient() || err.is_timeout())
        {
            debug!("Transient error detected: SMTP 4xx or timeout");
            return true;
        }
        if let Some(err) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            if matches!(
                err.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
    }

    let msg = error.to_string().to_lowercase();
    msg.contains("timed out")
        || msg.contains("connection refused")
        || msg.contains("connection reset")
        || msg.contains("service unavailable")
        || msg.contains("too many requests")
}

/// HTTP statuses the relay may recover from.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::network()
            .with_max_retries(3)
            .with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = retry_anyhow(fast(), "relay", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("connection refused");
                }
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: anyhow::Result<()> = retry_anyhow(fast(), "relay", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("relay rejected message: invalid recipient")
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: anyhow::Result<()> = retry_anyhow(fast().with_max_retries(2), "relay", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("request timed out")
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn test_io_errors_classified() {
        let err = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(is_transient_error(&err));
        let err = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!is_transient_error(&err));
    }
}
