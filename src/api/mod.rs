use crate::{otp::OtpService, session::JwtIssuer};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::options,
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Full application: documented routes, Swagger UI, request ids, tracing and state.
#[must_use]
pub fn app(otp: Arc<OtpService>, tokens: Arc<JwtIssuer>) -> Router {
    let (router, openapi) = router().split_for_parts();

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    router
        .route("/health", options(handlers::health::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(otp))
                .layer(Extension(tokens)),
        )
}

/// Start the server and serve until SIGINT or SIGTERM.
/// # Errors
/// Return error if the listener cannot be bound or the server fails
pub async fn new(port: u16, otp: Arc<OtpService>, tokens: Arc<JwtIssuer>) -> Result<()> {
    let app = app(otp, tokens);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gracefully shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        otp::{MemoryCache, OtpConfig, RecordingSink},
        session::{MemoryIdentityStore, SessionIssuer},
    };
    use anyhow::Result;
    use axum::{body::to_bytes, http::StatusCode, response::Response};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const PHONE: &str = "+14155550100";

    struct TestApp {
        router: Router,
        sink: Arc<RecordingSink>,
    }

    fn test_app(config: OtpConfig) -> TestApp {
        let tokens = Arc::new(JwtIssuer::new(
            &SecretString::from("test-secret".to_string()),
            "otp-auth",
        ));
        let sink = Arc::new(RecordingSink::new());
        let otp = Arc::new(OtpService::new(
            config,
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryIdentityStore::new()),
            SessionIssuer::new(tokens.clone(), Duration::from_secs(3600)),
            sink.clone(),
        ));
        TestApp {
            router: app(otp, tokens),
            sink,
        }
    }

    fn post(uri: &str, body: &Value) -> Result<Request<Body>> {
        Ok(Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?)
    }

    fn get(uri: &str, token: Option<&str>) -> Result<Request<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(builder.body(Body::empty())?)
    }

    async fn json_body(response: Response) -> Result<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn login(app: &TestApp, phone: &str) -> Result<Value> {
        let response = app
            .router
            .clone()
            .oneshot(post("/v1/auth/send-otp", &json!({ "phone_number": phone }))?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        let code = app.sink.last_code(phone).unwrap_or_default();
        let response = app
            .router
            .clone()
            .oneshot(post(
                "/v1/auth/verify-otp",
                &json!({ "phone_number": phone, "otp_code": code }),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    #[tokio::test]
    async fn send_and_verify_over_http() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let body = login(&app, PHONE).await?;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in_seconds"], 3600);
        assert_eq!(body["user"]["phone_number"], PHONE);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn send_otp_response_carries_expiry() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(post("/v1/auth/send-otp", &json!({ "phone_number": PHONE }))?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await?;
        assert_eq!(body["phone_number"], PHONE);
        assert_eq!(body["expires_in_seconds"], 120);
        assert!(body.get("code").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_phone_is_bad_request() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(post("/v1/auth/send-otp", &json!({ "phone_number": "12345" }))?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await?;
        assert_eq!(body["error"], "invalid_phone_number");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(post("/v1/auth/verify-otp", &json!({ "phone": PHONE }))?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_is_429() -> Result<()> {
        let app = test_app(OtpConfig::default().with_max_requests_per_window(1));
        let send = || post("/v1/auth/send-otp", &json!({ "phone_number": PHONE }));
        let first = app.router.clone().oneshot(send()?).await?;
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.router.clone().oneshot(send()?).await?;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_is_unauthorized() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(post(
                "/v1/auth/verify-otp",
                &json!({ "phone_number": PHONE, "otp_code": "123456" }),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await?;
        assert_eq!(body["error"], "otp_expired");
        Ok(())
    }

    #[tokio::test]
    async fn user_endpoints_require_token() -> Result<()> {
        let app = test_app(OtpConfig::default());
        for uri in ["/v1/users/me", "/v1/users", "/v1/users/1"] {
            let response = app.router.clone().oneshot(get(uri, None)?).await?;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            let response = app.router.clone().oneshot(get(uri, Some("junk"))?).await?;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn profile_list_and_lookup() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let alice = login(&app, PHONE).await?;
        login(&app, "+14155550101").await?;
        login(&app, "+4915112345678").await?;
        let token = alice["token"].as_str().unwrap_or_default().to_string();

        let me = app
            .router
            .clone()
            .oneshot(get("/v1/users/me", Some(&token))?)
            .await?;
        assert_eq!(me.status(), StatusCode::OK);
        let me = json_body(me).await?;
        assert_eq!(me["phone_number"], PHONE);

        let list = app
            .router
            .clone()
            .oneshot(get("/v1/users?page=1&page_size=2", Some(&token))?)
            .await?;
        assert_eq!(list.status(), StatusCode::OK);
        let list = json_body(list).await?;
        assert_eq!(list["total"], 3);
        assert_eq!(list["total_pages"], 2);
        assert_eq!(list["users"].as_array().map(Vec::len), Some(2));

        let filtered = app
            .router
            .clone()
            .oneshot(get("/v1/users?phone_number=%2B49", Some(&token))?)
            .await?;
        let filtered = json_body(filtered).await?;
        assert_eq!(filtered["total"], 1);

        let bad_page = app
            .router
            .clone()
            .oneshot(get("/v1/users?page_size=500", Some(&token))?)
            .await?;
        assert_eq!(bad_page.status(), StatusCode::BAD_REQUEST);

        let by_id = app
            .router
            .clone()
            .oneshot(get(&format!("/v1/users/{}", me["id"]), Some(&token))?)
            .await?;
        assert_eq!(by_id.status(), StatusCode::OK);

        let missing = app
            .router
            .clone()
            .oneshot(get("/v1/users/999", Some(&token))?)
            .await?;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_dependencies() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let response = app.router.clone().oneshot(get("/health", None)?).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-App"));
        let body = json_body(response).await?;
        assert_eq!(body["database"], "ok");
        assert_eq!(body["cache"], "ok");
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
        Ok(())
    }

    #[tokio::test]
    async fn openapi_document_is_served() -> Result<()> {
        let app = test_app(OtpConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(get("/api-docs/openapi.json", None)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert!(body["paths"]["/v1/auth/send-otp"].is_object());
        Ok(())
    }
}
