//! # otp-auth
//!
//! Phone number authentication with one-time passcodes.
//!
//! A client asks for a code for its phone number (`POST /v1/auth/send-otp`). The
//! service stores a short-lived challenge and hands the code to a notification
//! sink; there is no SMS gateway, the default sink writes it to the log. The
//! client then submits the code (`POST /v1/auth/verify-otp`) and, on a match,
//! receives a signed session token for the identity registered to that number.
//!
//! ## Limits
//!
//! - **Issuance:** at most `max_requests_per_window` codes per phone number per
//!   window. The window re-arms on every permitted request.
//! - **Verification:** a challenge is discarded once `max_attempts` wrong codes
//!   have been submitted, when it expires, or when it is used successfully.
//!
//! Challenge and rate-limit state lives behind [`otp::KeyValueCache`] (Redis or
//! in-memory); identities
//! live behind [`session::IdentityStore`] (`PostgreSQL` or in-memory).

pub mod api;
pub mod cli;
pub mod otp;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
