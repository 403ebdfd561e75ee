use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{
    middleware::{
        auth::{bearer_token, decode_token},
        client::{client_ip_label, device_type, user_agent},
    },
    services::activity_service::{self, NewActivityLog},
    state::AppState,
};

/// Record one activity log row per API response. The write runs in the
/// background; a failed write never affects the response.
pub async fn record_activity(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let caller = bearer_token(headers)
        .ok()
        .and_then(|token| decode_token(&state.config.jwt_secret, token).ok());
    let (username, role) = match &caller {
        Some(user) => {
            let name = if user.user_name.is_empty() {
                user.email.clone()
            } else {
                user.user_name.clone()
            };
            (name, if user.is_admin() { "Admin" } else { "User" })
        }
        None => ("Guest".to_string(), "Guest"),
    };
    let agent = user_agent(headers);

    let mut entry = NewActivityLog {
        username,
        url: request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string()),
        method: request.method().to_string(),
        role: role.to_string(),
        status: String::new(),
        device: device_type(agent.as_deref()).to_string(),
        user_agent: agent,
        authorization: if headers.contains_key(header::AUTHORIZATION) {
            "Bearer ***".to_string()
        } else {
            "None".to_string()
        },
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("None")
            .to_string(),
        ip_address: client_ip_label(
            headers,
            request.extensions(),
            state.config.rate_limits.trust_proxy,
        ),
    };

    let response = next.run(request).await;
    entry.status = response.status().as_u16().to_string();

    let pool = state.pool.clone();
    tokio::spawn(async move {
        match activity_service::record(&pool, &entry).await {
            Ok(()) => tracing::debug!(
                username = %entry.username,
                method = %entry.method,
                url = %entry.url,
                status = %entry.status,
                "activity logged"
            ),
            Err(err) => tracing::warn!(error = %err, "activity log write failed"),
        }
    });

    response
}
