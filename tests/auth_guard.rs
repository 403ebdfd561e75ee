mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use sparklenest_api::config::RateLimitConfig;
use tower::ServiceExt;

#[tokio::test]
async fn current_user_requires_a_bearer_token() {
    let app = common::offline_app(common::test_config(), &RateLimitConfig::default());

    let response = app
        .oneshot(Request::get("/api/user/current").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing Authorization header");
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let app = common::offline_app(common::test_config(), &RateLimitConfig::default());
    let secret = secrecy::SecretString::from("some-other-secret".to_string());
    let token = sparklenest_api::middleware::auth::issue_token(&secret, 1, &common::account("user"))
        .expect("token");

    let response = app
        .oneshot(
            Request::get("/api/cart/get_cart")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::json_body(response).await;
    assert_eq!(body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn admin_order_listing_is_forbidden_for_shoppers() {
    let app = common::offline_app(common::test_config(), &RateLimitConfig::default());
    let shopper = common::account("user");

    let response = app
        .oneshot(
            Request::get("/api/order/get_all_orders")
                .header(header::AUTHORIZATION, common::bearer_for(&shopper))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = common::json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Permission denied");
}

#[tokio::test]
async fn activity_logs_are_admin_only() {
    let app = common::offline_app(common::test_config(), &RateLimitConfig::default());
    let shopper = common::account("user");

    let response = app
        .oneshot(
            Request::get("/api/logs/activity-logs?page=1")
                .header(header::AUTHORIZATION, common::bearer_for(&shopper))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
