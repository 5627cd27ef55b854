//! Issuance and verification of one-time passcodes.
//!
//! A phone number has at most one pending challenge. From there it is either
//! verified (challenge consumed, session issued), lapses, or runs out of
//! attempts. Every read-then-write sequence on a phone's challenge or counter
//! runs under that phone's entry in a [`KeyedLock`], so concurrent requests for
//! one number are applied one after the other.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    cache::{with_deadline, KeyValueCache},
    code::{codes_match, generate, validate_code},
    error::OtpError,
    lock::KeyedLock,
    models::{IssuedOtp, OtpConfig},
    notify::NotificationSink,
    phone::{validate, PhoneNumber},
    rate_limit::RateLimiter,
    store::OtpStore,
};
use crate::session::{AuthenticatedSession, Identity, IdentityStore, SessionIssuer};

pub struct OtpService {
    config: OtpConfig,
    cache: Arc<dyn KeyValueCache>,
    store: OtpStore,
    limiter: RateLimiter,
    sink: Arc<dyn NotificationSink>,
    identities: Arc<dyn IdentityStore>,
    sessions: SessionIssuer,
    locks: KeyedLock,
}

impl OtpService {
    #[must_use]
    pub fn new(
        config: OtpConfig,
        cache: Arc<dyn KeyValueCache>,
        identities: Arc<dyn IdentityStore>,
        sessions: SessionIssuer,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = OtpStore::new(cache.clone(), config.store_timeout());
        let limiter = RateLimiter::new(cache.clone(), config.store_timeout());
        Self {
            config,
            cache,
            store,
            limiter,
            sink,
            identities,
            sessions,
            locks: KeyedLock::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    #[must_use]
    pub fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    #[must_use]
    pub fn session_lifetime(&self) -> std::time::Duration {
        self.sessions.lifetime()
    }

    /// Reachability of the challenge cache, bounded by the store timeout.
    ///
    /// # Errors
    /// Returns `OtpError::Store` if the cache does not answer.
    pub async fn ping_cache(&self) -> Result<(), OtpError> {
        with_deadline("ping", self.config.store_timeout(), self.cache.ping()).await?;
        Ok(())
    }

    /// Issue a fresh code for `raw_phone`, replacing any pending challenge.
    ///
    /// # Errors
    /// `InvalidPhoneNumber`, `RateLimitExceeded`, `RandomnessUnavailable`, or a
    /// transient `Store` failure.
    #[instrument(skip(self, raw_phone))]
    pub async fn send_otp(&self, raw_phone: &str) -> Result<IssuedOtp, OtpError> {
        let phone = validate(raw_phone)?;
        let _guard = self.locks.lock(phone.as_str()).await;

        let count = self.limiter.check_and_get(&phone).await?;
        if count >= self.config.max_requests_per_window() {
            warn!(phone_number = %phone, count, "OTP request rate limit exceeded");
            return Err(OtpError::RateLimitExceeded);
        }

        let code = generate(self.config.otp_length())?;
        let challenge = self
            .store
            .put(&phone, &code, self.config.otp_expiry())
            .await?;
        let count = self
            .limiter
            .increment(&phone, self.config.rate_limit_window())
            .await?;
        debug!(phone_number = %phone, count, "OTP issued");

        self.sink.emit(&phone, &code);

        Ok(IssuedOtp {
            phone_number: challenge.phone_number,
            expires_at: challenge.expires_at,
        })
    }

    /// Check `raw_code` against the pending challenge for `raw_phone` and, on a
    /// match, resolve the identity and issue a session token.
    ///
    /// # Errors
    /// `InvalidPhoneNumber`, `InvalidOtp`, `OtpExpired`, `TooManyAttempts`,
    /// `TokenIssuanceFailed`, or a transient `Store`/`Identity` failure.
    #[instrument(skip(self, raw_phone, raw_code))]
    pub async fn verify_otp(
        &self,
        raw_phone: &str,
        raw_code: &str,
    ) -> Result<AuthenticatedSession, OtpError> {
        let phone = validate(raw_phone)?;
        let code = validate_code(raw_code, self.config.otp_length())?;

        {
            let _guard = self.locks.lock(phone.as_str()).await;
            self.consume_challenge(&phone, code).await?;
        }

        let identity = self.resolve_identity(&phone).await?;
        let token = self.sessions.issue(&identity.id, &identity.phone_number)?;
        info!(phone_number = %phone, user_id = %identity.id, "phone number verified");

        Ok(AuthenticatedSession { token, identity })
    }

    /// Terminal outcomes (match, exhaustion) delete the challenge. Caller holds
    /// the phone's lock.
    async fn consume_challenge(&self, phone: &PhoneNumber, code: &str) -> Result<(), OtpError> {
        let Some(challenge) = self.store.get(phone).await? else {
            return Err(OtpError::OtpExpired);
        };

        let max_attempts = self.config.max_attempts();
        if challenge.attempts >= max_attempts {
            self.store.delete(phone).await?;
            return Err(OtpError::TooManyAttempts);
        }

        if !codes_match(&challenge.code, code) {
            let attempts = match self.store.increment_attempts(phone).await {
                Ok(attempts) => attempts,
                Err(OtpError::ChallengeNotFound) => return Err(OtpError::OtpExpired),
                Err(err) => return Err(err),
            };
            if attempts >= max_attempts {
                warn!(phone_number = %phone, attempts, "OTP attempts exhausted");
                self.store.delete(phone).await?;
                return Err(OtpError::TooManyAttempts);
            }
            return Err(OtpError::InvalidOtp);
        }

        self.store.delete(phone).await
    }

    async fn resolve_identity(&self, phone: &PhoneNumber) -> Result<Identity, OtpError> {
        if let Some(identity) = self.identities.find_by_phone(phone.as_str()).await? {
            return Ok(identity);
        }
        let identity = self.identities.create(phone.as_str()).await?;
        info!(phone_number = %phone, user_id = %identity.id, "new user registered");
        Ok(identity)
    }
}
