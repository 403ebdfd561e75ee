//! The Khalti client against an in-process fake gateway.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use sparklenest_api::{
    config::KhaltiConfig,
    khalti::{InitiateRequest, KhaltiClient, KhaltiError},
};

const SECRET: &str = "test-secret-key";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Key {SECRET}"))
}

async fn initiate(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Invalid token." })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "pidx": format!("pidx-{}", body["purchase_order_id"].as_str().unwrap_or("")),
            "payment_url": "https://pay.khalti.test/abc",
            "expires_at": "2026-10-19T12:00:00+05:45",
            "expires_in": 1800
        })),
    )
}

async fn lookup(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Invalid token." })));
    }
    match body["pidx"].as_str() {
        Some("known") => (
            StatusCode::OK,
            Json(json!({
                "pidx": "known",
                "total_amount": 250000,
                "status": "Completed",
                "transaction_id": "txn-1",
                "fee": 0,
                "refunded": false
            })),
        ),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Not found.", "error_key": "validation_error" })),
        ),
    }
}

async fn spawn_gateway() -> SocketAddr {
    let app = Router::new()
        .route("/api/v2/epayment/initiate/", post(initiate))
        .route("/api/v2/epayment/lookup/", post(lookup));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr, secret: &str) -> KhaltiClient {
    let config = KhaltiConfig {
        secret_key: Some(SecretString::from(secret.to_string())),
        gateway_url: Some(format!("http://{addr}/")),
        backend_uri: None,
        website_url: "http://localhost:3000".into(),
    };
    KhaltiClient::new(&config).unwrap()
}

fn order_request() -> InitiateRequest {
    InitiateRequest {
        return_url: "http://localhost:5000/api/khalti/complete-khalti-payment".into(),
        website_url: "http://localhost:3000".into(),
        amount: 250000,
        purchase_order_id: "order-42".into(),
        purchase_order_name: "SparkleNest order".into(),
        customer_info: None,
    }
}

#[tokio::test]
async fn initiate_and_lookup_against_the_gateway() {
    let addr = spawn_gateway().await;
    let client = client_for(addr, SECRET);
    assert!(client.is_configured());

    let session = client.initiate(&order_request()).await.unwrap();
    assert_eq!(session.pidx, "pidx-order-42");
    assert_eq!(session.payment_url, "https://pay.khalti.test/abc");

    let status = client.lookup("known").await.unwrap();
    assert!(status.is_completed());
    assert_eq!(status.total_amount, 250000);
    assert_eq!(status.transaction_id.as_deref(), Some("txn-1"));
}

#[tokio::test]
async fn wrong_secret_maps_to_unauthorized() {
    let addr = spawn_gateway().await;
    let client = client_for(addr, "wrong-key");

    let err = client.initiate(&order_request()).await.unwrap_err();
    assert!(matches!(err, KhaltiError::Unauthorized));
}

#[tokio::test]
async fn bad_request_detail_is_surfaced() {
    let addr = spawn_gateway().await;
    let client = client_for(addr, SECRET);

    let err = client.lookup("missing").await.unwrap_err();
    match err {
        KhaltiError::Rejected(detail) => assert_eq!(detail, "Not found."),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_requests_never_reach_the_gateway() {
    let client = client_for("127.0.0.1:9".parse().unwrap(), SECRET);

    let mut request = order_request();
    request.amount = 0;
    assert!(matches!(
        client.initiate(&request).await,
        Err(KhaltiError::MissingField("amount"))
    ));
    assert!(matches!(
        client.lookup("  ").await,
        Err(KhaltiError::MissingField("pidx"))
    ));
}

#[tokio::test]
async fn unconfigured_client_reports_the_missing_setting() {
    let client = KhaltiClient::new(&KhaltiConfig::default()).unwrap();
    assert!(!client.is_configured());

    let err = client.initiate(&order_request()).await.unwrap_err();
    assert!(matches!(err, KhaltiError::NotConfigured("KHALTI_SECRET_KEY")));
}
