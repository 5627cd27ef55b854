//! Outstanding challenges, one per phone number, stored under `otp:<phone>`.

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tracing::warn;

use super::{
    cache::{with_deadline, KeyValueCache},
    error::{CacheError, OtpError},
    models::OtpChallenge,
    phone::PhoneNumber,
};

pub(crate) fn otp_key(phone: &PhoneNumber) -> String {
    format!("otp:{phone}")
}

fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Clone)]
pub struct OtpStore {
    cache: Arc<dyn KeyValueCache>,
    timeout: Duration,
}

impl OtpStore {
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Replace any existing challenge with a fresh one (attempts reset to 0).
    ///
    /// # Errors
    /// Returns `OtpError::Store` if the cache write fails or times out.
    pub async fn put(
        &self,
        phone: &PhoneNumber,
        code: &str,
        ttl: Duration,
    ) -> Result<OtpChallenge, OtpError> {
        let now = Utc::now();
        let challenge = OtpChallenge {
            phone_number: phone.to_string(),
            code: code.to_string(),
            issued_at: now,
            expires_at: expiry_from(now, ttl),
            attempts: 0,
        };
        let key = otp_key(phone);
        let value = encode(&key, &challenge)?;
        with_deadline("set", self.timeout, self.cache.set(&key, value, ttl)).await?;
        Ok(challenge)
    }

    /// Live challenge for `phone`, or `None` when absent or past its `expires_at`.
    ///
    /// The timestamp is checked here as well because cache eviction can lag.
    ///
    /// # Errors
    /// Returns `OtpError::Store` on cache failures or malformed entries.
    pub async fn get(&self, phone: &PhoneNumber) -> Result<Option<OtpChallenge>, OtpError> {
        let key = otp_key(phone);
        let Some(raw) = with_deadline("get", self.timeout, self.cache.get(&key)).await? else {
            return Ok(None);
        };

        let challenge: OtpChallenge =
            serde_json::from_str(&raw).map_err(|source| CacheError::Corrupt {
                key: key.clone(),
                source,
            })?;

        if challenge.is_expired(Utc::now()) {
            if let Err(err) = self.delete(phone).await {
                warn!("Failed to remove lapsed challenge: {err}");
            }
            return Ok(None);
        }

        Ok(Some(challenge))
    }

    /// Remove the challenge for `phone`; absent challenges are fine.
    ///
    /// # Errors
    /// Returns `OtpError::Store` if the cache delete fails or times out.
    pub async fn delete(&self, phone: &PhoneNumber) -> Result<(), OtpError> {
        let key = otp_key(phone);
        with_deadline("delete", self.timeout, self.cache.delete(&key)).await?;
        Ok(())
    }

    /// Add one failed attempt to the live challenge, keeping its remaining TTL.
    /// Returns the new attempt count.
    ///
    /// The read and the write are two cache calls; callers serialize them per phone.
    ///
    /// # Errors
    /// Returns `OtpError::ChallengeNotFound` if no live challenge exists (or it lapsed
    /// between the read and the write), `OtpError::Store` on cache failures.
    pub async fn increment_attempts(&self, phone: &PhoneNumber) -> Result<u32, OtpError> {
        let Some(mut challenge) = self.get(phone).await? else {
            return Err(OtpError::ChallengeNotFound);
        };
        challenge.attempts = challenge.attempts.saturating_add(1);

        let key = otp_key(phone);
        let value = encode(&key, &challenge)?;
        let replaced = with_deadline(
            "replace_keep_ttl",
            self.timeout,
            self.cache.replace_keep_ttl(&key, value),
        )
        .await?;

        if replaced {
            Ok(challenge.attempts)
        } else {
            Err(OtpError::ChallengeNotFound)
        }
    }
}

fn encode(key: &str, challenge: &OtpChallenge) -> Result<String, CacheError> {
    serde_json::to_string(challenge).map_err(|source| CacheError::Corrupt {
        key: key.to_string(),
        source,
    })
}
