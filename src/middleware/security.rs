use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    middleware::client::request_info,
    response::ApiResponse,
    security_log::{MAX_LOGGED_INPUT, SecurityEvent, detect_suspicious, redact, truncate},
    state::AppState,
};

fn is_json(content_type: Option<&header::HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Inspect JSON bodies and query strings for injection markers. Matches are
/// logged as security events; the request always proceeds.
pub async fn suspicious_input(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let info = request_info(
        request.method(),
        request.uri(),
        request.headers(),
        request.extensions(),
        state.config.rate_limits.trust_proxy,
    );
    let mut inspected = String::new();

    let request = if is_json(request.headers().get(header::CONTENT_TYPE)) {
        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, state.config.body_limit).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "request body rejected");
                let body: ApiResponse<()> = ApiResponse::failure("Request body is too large", None);
                return (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response();
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => inspected.push_str(&redact(value).to_string()),
            Err(_) => inspected.push_str(&String::from_utf8_lossy(&bytes)),
        }
        Request::from_parts(parts, Body::from(bytes))
    } else {
        request
    };

    if let Some(query) = request.uri().query() {
        inspected.push_str(query);
    }

    if let Some(pattern) = detect_suspicious(&inspected) {
        let logger = state.security.clone();
        let details = serde_json::json!({
            "pattern": pattern,
            "input": truncate(&inspected, MAX_LOGGED_INPUT),
        });
        tokio::spawn(async move {
            logger
                .record(SecurityEvent::SuspiciousInputDetected, &info, details)
                .await;
        });
    }

    next.run(request).await
}

/// Record failed logins with the reason the handler gave.
pub async fn auth_failure_logger(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !request.uri().path().contains("/login") {
        return next.run(request).await;
    }

    let info = request_info(
        request.method(),
        request.uri(),
        request.headers(),
        request.extensions(),
        state.config.rate_limits.trust_proxy,
    );
    let via_proxy = request.headers().contains_key("x-forwarded-for");
    let response = next.run(request).await;
    if response.status().is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to buffer login response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let reason = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| "Unknown".to_string());

    state
        .security
        .record(
            SecurityEvent::AuthenticationFailure,
            &info,
            serde_json::json!({
                "reason": reason,
                "status": parts.status.as_u16(),
                "attempts": if via_proxy { "proxy" } else { "direct" },
            }),
        )
        .await;

    Response::from_parts(parts, Body::from(bytes))
}
