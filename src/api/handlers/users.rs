//! Read-only user endpoints. All of them require a bearer token.

use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use super::{error_response, principal::require_auth, ErrorResponse};
use crate::{
    otp::OtpService,
    session::{Identity, IdentityId, IdentityStore, JwtIssuer},
};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    /// Numeric or string identifier, as assigned by the identity store.
    #[schema(value_type = Object)]
    pub id: IdentityId,
    pub phone_number: String,
    pub registered_at: DateTime<Utc>,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            phone_number: identity.phone_number,
            registered_at: identity.registered_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserList {
    pub users: Vec<UserResponse>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Page number, starting at 1 (default 1)
    pub page: Option<u32>,
    /// Page size, 1 to 100 (default 10)
    pub page_size: Option<u32>,
    /// Substring match on the phone number
    pub phone_number: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct Page {
    page: u32,
    page_size: u32,
    phone_filter: Option<String>,
}

fn page_from_query(query: ListUsersQuery) -> Result<Page, &'static str> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err("page must be at least 1");
    }
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err("page_size must be between 1 and 100");
    }
    let phone_filter = query
        .phone_number
        .map(|filter| filter.trim().to_string())
        .filter(|filter| !filter.is_empty());
    Ok(Page {
        page,
        page_size,
        phone_filter,
    })
}

fn total_pages(total: u64, page_size: u32) -> u64 {
    total.div_ceil(u64::from(page_size.max(1)))
}

fn unauthorized() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Missing or invalid bearer token",
    )
}

async fn lookup(identities: &dyn IdentityStore, id: &IdentityId) -> Response {
    match identities.find_by_id(id).await {
        Ok(Some(identity)) => (StatusCode::OK, Json(UserResponse::from(identity))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", "User not found"),
        Err(err) => {
            error!("Failed to fetch user: {err}");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "Failed to retrieve user",
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/me",
    responses(
        (status = 200, description = "Profile of the authenticated user", body = UserResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn me(
    headers: HeaderMap,
    otp: Extension<Arc<OtpService>>,
    tokens: Extension<Arc<JwtIssuer>>,
) -> impl IntoResponse {
    let Ok(principal) = require_auth(&headers, &tokens) else {
        return unauthorized();
    };
    lookup(&**otp.identities(), &principal.user_id).await
}

#[utoipa::path(
    get,
    path = "/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users, newest first", body = UserList),
        (status = 400, description = "Invalid pagination parameters", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    otp: Extension<Arc<OtpService>>,
    tokens: Extension<Arc<JwtIssuer>>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> impl IntoResponse {
    if require_auth(&headers, &tokens).is_err() {
        return unauthorized();
    }

    let page = match query.map_err(|_| "invalid query parameters") {
        Ok(Query(query)) => page_from_query(query),
        Err(message) => Err(message),
    };
    let page = match page {
        Ok(page) => page,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, "bad_request", message),
    };

    match otp
        .identities()
        .list(page.page, page.page_size, page.phone_filter.as_deref())
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(UserList {
                users: result.identities.into_iter().map(Into::into).collect(),
                total: result.total,
                page: page.page,
                page_size: page.page_size,
                total_pages: total_pages(result.total, page.page_size),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "Failed to retrieve users",
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 400, description = "Invalid user id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    otp: Extension<Arc<OtpService>>,
    tokens: Extension<Arc<JwtIssuer>>,
) -> impl IntoResponse {
    if require_auth(&headers, &tokens).is_err() {
        return unauthorized();
    }
    if id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "bad_request", "Invalid user ID");
    }
    lookup(&**otp.identities(), &IdentityId::parse(&id)).await
}
