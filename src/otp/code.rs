//! One-time passcode generation, format checks and constant-time comparison.

use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use super::error::OtpError;

// Largest multiple of 10 that fits in a byte; higher bytes are rejected so
// every digit stays uniform.
const UNBIASED_LIMIT: u8 = 250;

/// Generate a numeric code of `length` digits from the OS CSPRNG.
///
/// # Errors
/// Returns `OtpError::RandomnessUnavailable` if the OS source fails.
pub fn generate(length: usize) -> Result<String, OtpError> {
    generate_with(&mut OsRng, length)
}

/// Same as [`generate`] with an explicit source. Only secure sources belong here.
///
/// # Errors
/// Returns `OtpError::RandomnessUnavailable` if the source fails.
pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R, length: usize) -> Result<String, OtpError> {
    let mut code = String::with_capacity(length);
    let mut buf = vec![0u8; length.max(1)];

    while code.len() < length {
        rng.try_fill_bytes(&mut buf)
            .map_err(OtpError::RandomnessUnavailable)?;

        for byte in buf.iter().copied().filter(|b| *b < UNBIASED_LIMIT) {
            if code.len() == length {
                break;
            }
            code.push(char::from(b'0' + byte % 10));
        }
    }

    Ok(code)
}

/// Normalize a submitted code: trimmed, exactly `expected_len` ASCII digits.
///
/// # Errors
/// Returns `OtpError::InvalidOtp` for anything else.
pub fn validate_code(raw: &str, expected_len: usize) -> Result<&str, OtpError> {
    let code = raw.trim();
    if code.len() != expected_len || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OtpError::InvalidOtp);
    }
    Ok(code)
}

/// Compare a submitted code with the stored one without leaking the position
/// of the first differing digit.
#[must_use]
pub fn codes_match(stored: &str, submitted: &str) -> bool {
    stored.as_bytes().ct_eq(submitted.as_bytes()).into()
}
