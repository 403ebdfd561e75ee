use std::collections::BTreeMap;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    middleware::rate_limit::describe_limits,
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthData {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct DebugData {
    pub environment: String,
    pub database_connected: bool,
    pub email_configured: bool,
    pub recaptcha_configured: bool,
    pub khalti_configured: bool,
    pub login_otp_enabled: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct RateLimitStatus {
    /// Budget per tier, e.g. `"auth": "5 attempts per 15 minutes"`.
    pub limits: BTreeMap<String, String>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "OK", body = ApiResponse<HealthData>),
    ),
    tag = "Health"
)]
pub async fn health_check() -> Json<ApiResponse<HealthData>> {
    let data = HealthData {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    };

    Json(ApiResponse::success(
        "Health check",
        data,
        Some(Meta::empty()),
    ))
}

#[utoipa::path(
    get,
    path = "/test",
    responses((status = 200, description = "Server is reachable", body = ApiResponse<HealthData>)),
    tag = "Health"
)]
pub async fn test_endpoint() -> Json<ApiResponse<HealthData>> {
    Json(ApiResponse::success(
        "Server is working!",
        HealthData {
            status: "ok".to_string(),
            timestamp: Utc::now(),
        },
        None,
    ))
}

#[utoipa::path(
    get,
    path = "/debug",
    responses((status = 200, description = "Dependency status, no secrets", body = ApiResponse<DebugData>)),
    tag = "Health"
)]
pub async fn debug_info(State(state): State<AppState>) -> Json<ApiResponse<DebugData>> {
    let database_connected = match state.orm.ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "database ping failed");
            false
        }
    };

    Json(ApiResponse::success(
        "Debug info",
        DebugData {
            environment: state.config.environment.clone(),
            database_connected,
            email_configured: state.mailer.is_configured(),
            recaptcha_configured: state.config.recaptcha_secret.is_some(),
            khalti_configured: state.khalti.is_configured(),
            login_otp_enabled: state.config.login_otp_enabled,
            timestamp: Utc::now(),
        },
        None,
    ))
}

#[utoipa::path(
    get,
    path = "/api/status/rate-limits",
    responses((status = 200, description = "Active rate limits", body = ApiResponse<RateLimitStatus>)),
    tag = "Health"
)]
pub async fn rate_limit_status(State(state): State<AppState>) -> Json<ApiResponse<RateLimitStatus>> {
    let limits = describe_limits(&state.config.rate_limits)
        .into_iter()
        .map(|(tier, budget)| (tier.to_string(), budget))
        .collect();

    Json(ApiResponse::success(
        "Rate limit status",
        RateLimitStatus { limits },
        None,
    ))
}
