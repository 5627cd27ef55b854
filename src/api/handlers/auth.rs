//! Passcode issuance and verification endpoints.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use super::{error_response, otp_error_response, users::UserResponse, ErrorResponse};
use crate::otp::OtpService;

#[derive(ToSchema, Deserialize, Serialize, Debug)]
pub struct SendOtpRequest {
    #[schema(example = "+14155550100")]
    pub phone_number: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendOtpResponse {
    pub message: String,
    pub phone_number: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: u64,
}

#[derive(ToSchema, Deserialize, Serialize, Debug)]
pub struct VerifyOtpRequest {
    #[schema(example = "+14155550100")]
    pub phone_number: String,
    #[schema(example = "123456")]
    pub otp_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in_seconds: u64,
    pub user: UserResponse,
}

fn bad_payload(rejection: &JsonRejection) -> axum::response::Response {
    debug!("Rejected payload: {rejection}");
    error_response(StatusCode::BAD_REQUEST, "bad_request", "Invalid request body")
}

/// Issue a one-time passcode for a phone number. The code is delivered out of band.
#[utoipa::path(
    post,
    path = "/v1/auth/send-otp",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "OTP issued", body = SendOtpResponse),
        (status = 400, description = "Invalid phone number or payload", body = ErrorResponse),
        (status = 429, description = "Too many OTP requests", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn send_otp(
    otp: Extension<Arc<OtpService>>,
    payload: Result<Json<SendOtpRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_payload(&rejection),
    };

    match otp.send_otp(&request.phone_number).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(SendOtpResponse {
                message: "OTP sent successfully".to_string(),
                phone_number: issued.phone_number,
                expires_at: issued.expires_at,
                expires_in_seconds: otp.config().otp_expiry().as_secs(),
            }),
        )
            .into_response(),
        Err(err) => otp_error_response(&err),
    }
}

/// Verify a passcode; returns a bearer token and the (possibly new) user.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Phone number verified", body = VerifyOtpResponse),
        (status = 400, description = "Invalid phone number or payload", body = ErrorResponse),
        (status = 401, description = "Invalid, expired or exhausted OTP", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    otp: Extension<Arc<OtpService>>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_payload(&rejection),
    };

    match otp
        .verify_otp(&request.phone_number, &request.otp_code)
        .await
    {
        Ok(session) => (
            StatusCode::OK,
            Json(VerifyOtpResponse {
                token: session.token,
                token_type: "Bearer".to_string(),
                expires_in_seconds: otp.session_lifetime().as_secs(),
                user: session.identity.into(),
            }),
        )
            .into_response(),
        Err(err) => otp_error_response(&err),
    }
}
