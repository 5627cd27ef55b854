use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_OTP_LENGTH: usize = 6;
const DEFAULT_OTP_EXPIRY_SECONDS: u64 = 2 * 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 10 * 60;
const DEFAULT_MAX_REQUESTS_PER_WINDOW: u32 = 3;
const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 3;

/// The single outstanding code for a phone number, as stored under `otp:<phone>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub phone_number: String,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

impl OtpChallenge {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of a successful issuance. The code itself only goes to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedOtp {
    pub phone_number: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct OtpConfig {
    otp_length: usize,
    otp_expiry: Duration,
    max_attempts: u32,
    rate_limit_window: Duration,
    max_requests_per_window: u32,
    store_timeout: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            otp_length: DEFAULT_OTP_LENGTH,
            otp_expiry: Duration::from_secs(DEFAULT_OTP_EXPIRY_SECONDS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
            max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECONDS),
        }
    }
}

impl OtpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_otp_length(mut self, length: usize) -> Self {
        self.otp_length = length;
        self
    }

    #[must_use]
    pub fn with_otp_expiry(mut self, expiry: Duration) -> Self {
        self.otp_expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit_window = window;
        self
    }

    #[must_use]
    pub fn with_max_requests_per_window(mut self, requests: u32) -> Self {
        self.max_requests_per_window = requests;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    #[must_use]
    pub fn otp_expiry(&self) -> Duration {
        self.otp_expiry
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    #[must_use]
    pub fn max_requests_per_window(&self) -> u32 {
        self.max_requests_per_window
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}
