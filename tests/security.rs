mod common;

use std::{net::SocketAddr, path::Path, time::Duration};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use sparklenest_api::{
    config::RateLimitConfig,
    security_log::{RequestInfo, SecurityEvent, SecurityLogger, detect_suspicious, redact},
};
use tower::ServiceExt;

fn request() -> RequestInfo {
    RequestInfo {
        ip: "203.0.113.9".into(),
        user_agent: Some("Mozilla/5.0 Firefox".into()),
        url: "/api/user/login".into(),
        method: "POST".into(),
    }
}

#[tokio::test]
async fn events_are_appended_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let logger = SecurityLogger::new(dir.path().join("logs").join("security.log"));
    logger.prepare().await.unwrap();

    logger
        .record(
            SecurityEvent::AuthenticationFailure,
            &request(),
            json!({ "reason": "Invalid credentials", "status": 401 }),
        )
        .await;
    logger
        .record(
            SecurityEvent::RateLimitExceeded,
            &request(),
            json!({ "tier": "auth" }),
        )
        .await;

    let contents = tokio::fs::read_to_string(logger.path()).await.unwrap();
    let lines: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["event"], "AUTHENTICATION_FAILURE");
    assert_eq!(lines[0]["ip"], "203.0.113.9");
    assert_eq!(lines[0]["userAgent"], "Mozilla/5.0 Firefox");
    assert_eq!(lines[0]["details"]["reason"], "Invalid credentials");
    assert!(lines[0]["timestamp"].is_string());

    assert_eq!(lines[1]["event"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(lines[1]["details"]["tier"], "auth");
}

#[test]
fn injection_markers_are_detected() {
    assert!(detect_suspicious("name=x' UNION SELECT 1").is_some());
    assert!(detect_suspicious("<img onerror=alert(1)>").is_some());
    assert!(detect_suspicious("file=../../secret").is_some());
    assert_eq!(detect_suspicious("page=2"), None);
}

#[test]
fn credentials_never_reach_the_log() {
    let body = redact(json!({
        "email": "shopper@sparklenest.test",
        "password": "Sup3r#Secret",
        "items": [{ "token": "abc", "quantity": 2 }]
    }));

    assert_eq!(body["password"], "[REDACTED]");
    assert_eq!(body["items"][0]["token"], "[REDACTED]");
    assert_eq!(body["items"][0]["quantity"], 2);
    assert_eq!(body["email"], "shopper@sparklenest.test");
}

/// Parsed log lines, waiting briefly for events written off the request path.
async fn logged_events(path: &Path) -> Vec<Value> {
    for _ in 0..50 {
        if let Ok(contents) = tokio::fs::read_to_string(path).await {
            let lines: Vec<Value> = contents
                .lines()
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect();
            if !lines.is_empty() {
                return lines;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Vec::new()
}

fn from_peer(mut request: Request<Body>) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 44], 50500))));
    request
}

#[tokio::test]
async fn failed_login_is_logged_with_the_handler_reason() {
    let config = common::test_config();
    let log_path = config.security_log_path.clone();
    let app = common::offline_app(config, &RateLimitConfig::default());

    let request = from_peer(
        Request::post("/api/user/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "Mozilla/5.0 Firefox/121.0")
            .header("x-forwarded-for", "10.9.9.9")
            .body(Body::from(r#"{"email":"","password":""}"#))
            .unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let events = logged_events(&log_path).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "AUTHENTICATION_FAILURE");
    assert_eq!(events[0]["ip"], "203.0.113.44");
    assert_eq!(events[0]["url"], "/api/user/login");
    assert_eq!(events[0]["userAgent"], "Mozilla/5.0 Firefox/121.0");
    assert_eq!(events[0]["details"]["reason"], "Please enter all fields");
    assert_eq!(events[0]["details"]["status"], 400);
}

#[tokio::test]
async fn suspicious_query_is_logged_and_still_served() {
    let config = common::test_config();
    let log_path = config.security_log_path.clone();
    let app = common::offline_app(config, &RateLimitConfig::default());

    let request = from_peer(
        Request::get("/api/status/rate-limits?file=../../etc/passwd")
            .body(Body::empty())
            .unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = logged_events(&log_path).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "SUSPICIOUS_INPUT_DETECTED");
    assert_eq!(events[0]["ip"], "203.0.113.44");
    assert!(
        events[0]["details"]["input"]
            .as_str()
            .is_some_and(|input| input.contains("../../etc/passwd"))
    );
}
