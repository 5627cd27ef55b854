//! Per-phone issuance counter over a fixed, re-arming window.
//!
//! Every increment resets the counter's expiry to the full window length, so
//! the window closes `window` after the most recent permitted request.

use std::{sync::Arc, time::Duration};

use super::{
    cache::{with_deadline, KeyValueCache},
    error::OtpError,
    phone::PhoneNumber,
};

pub(crate) fn rate_limit_key(phone: &PhoneNumber) -> String {
    format!("rate_limit:{phone}")
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn KeyValueCache>,
    timeout: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Requests counted in the current window; 0 when none or the window lapsed.
    ///
    /// # Errors
    /// Returns `OtpError::Store` on cache failures.
    pub async fn check_and_get(&self, phone: &PhoneNumber) -> Result<u32, OtpError> {
        let key = rate_limit_key(phone);
        let raw = with_deadline("get", self.timeout, self.cache.get(&key)).await?;
        Ok(raw
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|count| u32::try_from(count).ok())
            .unwrap_or(0))
    }

    /// Count one more request and re-arm the window. Returns the new count.
    ///
    /// # Errors
    /// Returns `OtpError::Store` on cache failures.
    pub async fn increment(&self, phone: &PhoneNumber, window: Duration) -> Result<u32, OtpError> {
        let key = rate_limit_key(phone);
        let count = with_deadline(
            "incr_expire",
            self.timeout,
            self.cache.incr_expire(&key, window),
        )
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
