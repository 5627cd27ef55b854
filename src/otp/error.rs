use std::time::Duration;

use crate::session::{IdentityError, TokenError};

/// Failures of the shared key-value cache backing the OTP store and rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("malformed cache entry for {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Every outcome the OTP engine can report besides success.
///
/// Callers match on the variant; `ChallengeNotFound` never leaves the engine
/// and is reported as `OtpExpired`.
#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("invalid phone number format")]
    InvalidPhoneNumber,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("secure randomness unavailable: {0}")]
    RandomnessUnavailable(#[source] rand::Error),
    #[error("invalid OTP")]
    InvalidOtp,
    #[error("OTP has expired")]
    OtpExpired,
    #[error("too many OTP attempts")]
    TooManyAttempts,
    #[error("no live challenge for phone number")]
    ChallengeNotFound,
    #[error("failed to issue session token: {0}")]
    TokenIssuanceFailed(#[source] TokenError),
    #[error("OTP store unavailable: {0}")]
    Store(#[from] CacheError),
    #[error("identity store unavailable: {0}")]
    Identity(#[from] IdentityError),
}

impl OtpError {
    /// Failures of a backing store rather than of the request itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Identity(_))
    }
}
