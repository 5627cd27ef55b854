//! Route handlers and the shared error body.

pub mod auth;
pub mod health;
pub mod principal;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::otp::OtpError;

/// Body of every non-2xx JSON response.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Map an engine outcome to its HTTP status and error body.
pub(crate) fn otp_error_response(err: &OtpError) -> Response {
    let (status, code, message) = match err {
        OtpError::InvalidPhoneNumber => (
            StatusCode::BAD_REQUEST,
            "invalid_phone_number",
            "Invalid phone number format",
        ),
        OtpError::RateLimitExceeded => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "Too many OTP requests, try again later",
        ),
        OtpError::InvalidOtp => (StatusCode::UNAUTHORIZED, "invalid_otp", "Invalid OTP"),
        OtpError::OtpExpired | OtpError::ChallengeNotFound => (
            StatusCode::UNAUTHORIZED,
            "otp_expired",
            "OTP has expired or was never requested",
        ),
        OtpError::TooManyAttempts => (
            StatusCode::UNAUTHORIZED,
            "too_many_attempts",
            "Too many failed attempts, request a new OTP",
        ),
        OtpError::Store(_) | OtpError::Identity(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "service_unavailable",
            "Service temporarily unavailable",
        ),
        OtpError::RandomnessUnavailable(_) | OtpError::TokenIssuanceFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        ),
    };

    if status.is_server_error() {
        error!("Request failed: {err}");
    }

    error_response(status, code, message)
}
