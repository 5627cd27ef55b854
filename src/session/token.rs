//! HS256 bearer tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::identity::IdentityId;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub user_id: IdentityId,
    pub phone_number: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub iss: String,
    pub jti: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token lifetime out of range")]
    Lifetime,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Produces signed session tokens for verified identities.
pub trait TokenIssuer: Send + Sync {
    /// # Errors
    /// Returns an error if the token cannot be produced.
    fn issue(
        &self,
        identity_id: &IdentityId,
        phone_number: &str,
        lifetime: Duration,
    ) -> Result<String, TokenError>;
}

#[derive(Clone)]
pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, issuer: impl Into<String>) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    fn issue_at(
        &self,
        identity_id: &IdentityId,
        phone_number: &str,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<String, TokenError> {
        let lifetime = chrono::Duration::from_std(lifetime).map_err(|_| TokenError::Lifetime)?;
        let exp = now.checked_add_signed(lifetime).ok_or(TokenError::Lifetime)?;

        let claims = Claims {
            sub: identity_id.to_string(),
            user_id: identity_id.clone(),
            phone_number: phone_number.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Check signature, issuer and time bounds, returning the claims.
    ///
    /// # Errors
    /// `TokenError::Expired` for lapsed tokens, `TokenError::Invalid` otherwise.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err),
            })
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(
        &self,
        identity_id: &IdentityId,
        phone_number: &str,
        lifetime: Duration,
    ) -> Result<String, TokenError> {
        self.issue_at(identity_id, phone_number, Utc::now(), lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn issuer(secret: &str) -> JwtIssuer {
        JwtIssuer::new(&SecretString::from(secret.to_string()), "otp-auth")
    }

    #[test]
    fn issue_and_verify() -> Result<(), TokenError> {
        let jwt = issuer("test-secret");
        let token = jwt.issue(&IdentityId::Numeric(42), "+14155550100", DAY)?;
        let claims = jwt.verify(&token)?;

        assert_eq!(claims.user_id, IdentityId::Numeric(42));
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.phone_number, "+14155550100");
        assert_eq!(claims.iss, "otp-auth");
        assert_eq!(claims.exp - claims.iat, 86_400);
        Ok(())
    }

    #[test]
    fn wrong_secret_is_rejected() -> Result<(), TokenError> {
        let token = issuer("one").issue(&IdentityId::Numeric(1), "+14155550100", DAY)?;
        assert!(matches!(
            issuer("two").verify(&token),
            Err(TokenError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            issuer("s").verify("not-a-token"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn lapsed_token_is_expired() -> Result<(), TokenError> {
        let jwt = issuer("test-secret");
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        let token = jwt.issue_at(
            &IdentityId::Numeric(1),
            "+14155550100",
            two_hours_ago,
            Duration::from_secs(3600),
        )?;
        assert!(matches!(jwt.verify(&token), Err(TokenError::Expired)));
        Ok(())
    }

    #[test]
    fn foreign_issuer_is_rejected() -> Result<(), TokenError> {
        let other = JwtIssuer::new(&SecretString::from("s".to_string()), "elsewhere");
        let token = other.issue(&IdentityId::Numeric(1), "+14155550100", DAY)?;
        assert!(issuer("s").verify(&token).is_err());
        Ok(())
    }
}
