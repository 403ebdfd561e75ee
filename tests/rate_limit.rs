mod common;

use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use sparklenest_api::config::{RateLimitConfig, RateLimitTier};
use tower::ServiceExt;

fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 51000))));
    request
}

fn login_attempt(peer: [u8; 4]) -> Request<Body> {
    from_peer(
        Request::post("/api/user/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
        peer,
    )
}

fn app_with_auth_budget(max: u32, trust_proxy: bool) -> Router {
    let limits = RateLimitConfig {
        trust_proxy,
        auth: RateLimitTier::new(max, 60),
        ..RateLimitConfig::default()
    };
    let mut config = common::test_config();
    config.rate_limits = limits;
    common::offline_app(config, &limits)
}

#[tokio::test]
async fn auth_tier_answers_429_with_json_once_exhausted() {
    let app = app_with_auth_budget(2, false);

    for _ in 0..2 {
        let response = app.clone().oneshot(login_attempt([203, 0, 113, 7])).await.unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = app.oneshot(login_attempt([203, 0, 113, 7])).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = common::json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Too many authentication attempts, please try again later."
    );
    assert_eq!(body["retryAfter"], "1 minute");
}

#[tokio::test]
async fn budgets_are_tracked_per_client_ip() {
    let app = app_with_auth_budget(1, false);

    let first = app.clone().oneshot(login_attempt([198, 51, 100, 1])).await.unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    let blocked = app.clone().oneshot(login_attempt([198, 51, 100, 1])).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.oneshot(login_attempt([198, 51, 100, 2])).await.unwrap();
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_budget() {
    let app = app_with_auth_budget(3, false);

    let mut limited = 0;
    for n in 0..20u8 {
        let mut request = login_attempt([198, 51, 100, 77]);
        request.headers_mut().insert(
            "x-forwarded-for",
            format!("10.1.2.{n}").parse().unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }

    assert_eq!(limited, 17);
}

#[tokio::test]
async fn trusted_proxy_keys_on_the_forwarded_client() {
    let app = app_with_auth_budget(1, true);
    let behind_proxy = |client: &str| {
        let mut request = login_attempt([10, 0, 0, 1]);
        request
            .headers_mut()
            .insert("x-forwarded-for", client.parse().unwrap());
        request
    };

    let first = app.clone().oneshot(behind_proxy("203.0.113.20")).await.unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);
    let blocked = app.clone().oneshot(behind_proxy("203.0.113.20")).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.oneshot(behind_proxy("203.0.113.21")).await.unwrap();
    assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn unrelated_groups_do_not_share_the_auth_budget() {
    let app = app_with_auth_budget(1, false);

    let _ = app.clone().oneshot(login_attempt([192, 0, 2, 10])).await.unwrap();
    let response = app
        .oneshot(from_peer(
            Request::get("/api/status/rate-limits").body(Body::empty()).unwrap(),
            [192, 0, 2, 10],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
