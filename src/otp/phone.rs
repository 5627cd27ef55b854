//! Phone number normalization and validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use tracing::error;

use super::error::OtpError;

const MIN_LEN: usize = 8;
const MAX_LEN: usize = 20;

// `+`, a nonzero leading digit, then 6..=14 more ASCII digits (7..=15 digits total).
// `\d` would also match other Unicode digit scripts.
static INTERNATIONAL_FORMAT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\+[1-9][0-9]{6,14}$")
        .inspect_err(|err| error!("phone number pattern failed to compile: {err}"))
        .ok()
});

/// A phone number that passed [`validate`]. The only key used for OTP and
/// rate-limit state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and validate a raw phone number.
    ///
    /// # Errors
    /// Returns `OtpError::InvalidPhoneNumber` when the input is not in international format.
    pub fn parse(raw: &str) -> Result<Self, OtpError> {
        validate(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim, length-check, filter and match the international format.
///
/// # Errors
/// Returns `OtpError::InvalidPhoneNumber` on any rule violation.
pub fn validate(raw: &str) -> Result<PhoneNumber, OtpError> {
    let trimmed = raw.trim();

    if !(MIN_LEN..=MAX_LEN).contains(&trimmed.len()) {
        return Err(OtpError::InvalidPhoneNumber);
    }

    if trimmed.contains("..") || trimmed.contains("--") {
        return Err(OtpError::InvalidPhoneNumber);
    }

    let matches = INTERNATIONAL_FORMAT
        .as_ref()
        .is_some_and(|re| re.is_match(trimmed));
    if !matches {
        return Err(OtpError::InvalidPhoneNumber);
    }

    Ok(PhoneNumber(trimmed.to_string()))
}
