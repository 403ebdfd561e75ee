pub mod config;
pub mod db;
pub mod dto;
pub mod entity;
pub mod error;
pub mod khalti;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod otp;
pub mod password;
pub mod recaptcha;
pub mod response;
pub mod routes;
pub mod security_log;
pub mod services;
pub mod state;
pub mod uploads;

use std::time::Duration;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, header},
    middleware::from_fn_with_state,
    routing::get,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    middleware::{activity_log::record_activity, rate_limit::RateLimiters, security},
    response::ApiResponse,
    routes::{create_api_router, doc::scalar_docs, health},
    state::AppState,
};

const MAX_IN_FLIGHT_REQUESTS: usize = 100;

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Assemble the full application: API routes, static uploads, docs and the
/// middleware stack.
pub fn build_app(state: AppState, limiters: &RateLimiters) -> Router {
    let api_router = create_api_router(limiters, &state.security)
        .layer(from_fn_with_state(state.clone(), record_activity));

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::debug!(method = %request.method(), uri = %request.uri(), "request started");
        })
        .on_response(|response: &Response<_>, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                status = %response.status(),
                ms = %latency.as_millis(),
                "request finished"
            );
        });

    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/test", get(health::test_endpoint))
        .route("/debug", get(health::debug_info))
        .nest("/api", api_router)
        .nest_service("/products", ServeDir::new(state.config.products_dir()))
        .nest_service("/profile", ServeDir::new(state.config.profile_dir()))
        .merge(scalar_docs())
        .fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.body_limit))
        .layer(from_fn_with_state(state.clone(), security::auth_failure_logger))
        .layer(from_fn_with_state(state.clone(), security::suspicious_input));

    limiters
        .general
        .apply(router, &state.security)
        .layer(cors_layer(&state.config.cors_origins))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let body = ApiResponse::failure(
        "Route not found",
        Some(serde_json::json!({ "path": uri.path() })),
    );
    (StatusCode::NOT_FOUND, Json(body))
}
