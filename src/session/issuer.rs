use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::error;

use super::{
    identity::{Identity, IdentityId},
    token::TokenIssuer,
};
use crate::otp::error::OtpError;

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedSession {
    pub token: String,
    pub identity: Identity,
}

/// Binds a token issuer to the configured session lifetime and maps its
/// failures into the OTP error space. No retries.
#[derive(Clone)]
pub struct SessionIssuer {
    issuer: Arc<dyn TokenIssuer>,
    lifetime: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(issuer: Arc<dyn TokenIssuer>, lifetime: Duration) -> Self {
        Self { issuer, lifetime }
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// # Errors
    /// Returns `OtpError::TokenIssuanceFailed` wrapping the issuer's error.
    pub fn issue(&self, identity_id: &IdentityId, phone_number: &str) -> Result<String, OtpError> {
        self.issuer
            .issue(identity_id, phone_number, self.lifetime)
            .map_err(|err| {
                error!("Failed to issue session token: {err}");
                OtpError::TokenIssuanceFailed(err)
            })
    }
}
