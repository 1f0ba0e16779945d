//! Error taxonomy for file lifecycle operations.
//!
//! Every outcome that is not a success maps onto one of these variants, and
//! each variant maps onto exactly one HTTP status class. Storage and blob I/O
//! failures are carried as `anyhow::Error` inside [`Error::Internal`] so the
//! full context chain reaches the logs without leaking to clients.

use crate::policy::DenyReason;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or out-of-range input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Owner token mismatch.
    #[error("owner token doesn't match")]
    Unauthorized,

    /// Unknown id, exhausted count, or already swept.
    #[error("file not found")]
    NotFound,

    /// Download blocked by geography, user agent, transport or delay.
    #[error("download denied: {0}")]
    PolicyDenied(DenyReason),

    /// Too many requests from one source.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Request body above the configured ceiling.
    #[error("payload too large")]
    PayloadTooLarge,

    /// Storage, database or blob I/O failure.
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized => 401,
            Self::PolicyDenied(_) => 403,
            Self::NotFound => 404,
            Self::PayloadTooLarge => 413,
            Self::RateLimited => 429,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("bad").status_code(), 400);
        assert_eq!(Error::Unauthorized.status_code(), 401);
        assert_eq!(
            Error::PolicyDenied(DenyReason::Location).status_code(),
            403
        );
        assert_eq!(Error::NotFound.status_code(), 404);
        assert_eq!(Error::PayloadTooLarge.status_code(), 413);
        assert_eq!(Error::RateLimited.status_code(), 429);
        assert_eq!(
            Error::Internal(anyhow::anyhow!("disk full")).status_code(),
            500
        );
    }

    #[test]
    fn test_internal_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to write blob");
        let msg = Error::from(err).to_string();
        assert!(msg.contains("Failed to write blob"));
        assert!(msg.contains("disk full"));
    }
}
