//! Khalti checkout against a real database and an in-process fake gateway.
//! Skipped unless `TEST_DATABASE_URL` is set.

mod common;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use sea_orm::EntityTrait;
use secrecy::SecretString;
use serde_json::{Value, json};

use sparklenest_api::{
    dto::{
        cart::AddToCartRequest,
        khalti::{CompletePaymentQuery, InitializePaymentRequest},
        orders::PlaceOrderRequest,
    },
    entity::orders::{Entity as Orders, PaymentMethod, PaymentStatus},
    error::AppError,
    services::{cart_service, order_service, payment_service},
};

/// pidx -> (status, total_amount) as the gateway would report it.
type Sessions = Arc<Mutex<HashMap<String, (String, i64)>>>;

async fn initiate(State(sessions): State<Sessions>, Json(body): Json<Value>) -> Json<Value> {
    let mut sessions = sessions.lock().unwrap();
    let pidx = format!("pidx-{}", sessions.len() + 1);
    let amount = body["amount"].as_i64().unwrap_or_default();
    sessions.insert(pidx.clone(), ("Initiated".into(), amount));
    Json(json!({
        "pidx": pidx,
        "payment_url": format!("https://pay.khalti.test/{pidx}"),
        "expires_at": "2026-10-19T12:00:00+05:45",
        "expires_in": 1800
    }))
}

async fn lookup(State(sessions): State<Sessions>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let pidx = body["pidx"].as_str().unwrap_or_default();
    match sessions.lock().unwrap().get(pidx) {
        Some((status, amount)) => (
            StatusCode::OK,
            Json(json!({
                "pidx": pidx,
                "total_amount": amount,
                "status": status,
                "transaction_id": if status == "Completed" { Some("txn-77") } else { None },
                "fee": 0,
                "refunded": false
            })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Not found.", "error_key": "validation_error" })),
        ),
    }
}

async fn spawn_gateway(sessions: Sessions) -> SocketAddr {
    let app = Router::new()
        .route("/api/v2/epayment/initiate/", post(initiate))
        .route("/api/v2/epayment/lookup/", post(lookup))
        .with_state(sessions);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn set_session(sessions: &Sessions, pidx: &str, status: &str, amount: i64) {
    sessions
        .lock()
        .unwrap()
        .insert(pidx.to_string(), (status.to_string(), amount));
}

fn returning(pidx: &str) -> CompletePaymentQuery {
    CompletePaymentQuery {
        pidx: Some(pidx.to_string()),
        status: None,
        transaction_id: None,
        purchase_order_id: None,
        amount: None,
    }
}

#[tokio::test]
async fn khalti_checkout_is_initiated_once_and_verified_by_lookup() -> anyhow::Result<()> {
    let sessions = Sessions::default();
    let gateway = spawn_gateway(sessions.clone()).await;

    let mut config = common::test_config();
    config.khalti.secret_key = Some(SecretString::from("test-secret-key".to_string()));
    config.khalti.gateway_url = Some(format!("http://{gateway}/"));
    config.khalti.backend_uri = Some("http://localhost:5000".into());
    let Some(state) = common::database_state(config).await? else {
        return Ok(());
    };

    let shopper = common::create_user(&state, "user").await?;
    let product = common::create_product(&state, 250_000, 3).await?;
    cart_service::add_to_cart(
        &state,
        &shopper,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    let order = order_service::place_order(
        &state,
        &shopper,
        PlaceOrderRequest {
            street: "Durbar Marg".into(),
            city: "Kathmandu".into(),
            phone: "9800000003".into(),
            payment_method: PaymentMethod::Khalti,
        },
    )
    .await?
    .data
    .unwrap()
    .order;
    let start = || InitializePaymentRequest {
        order_id: order.id,
        website_url: None,
    };

    let first = payment_service::initialize_payment(&state, &shopper, start())
        .await?
        .data
        .unwrap();
    assert_eq!(first.payment_url, format!("https://pay.khalti.test/{}", first.pidx));

    // The first session is still payable, so it must not be replaced.
    let again = payment_service::initialize_payment(&state, &shopper, start()).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    let stored = Orders::find_by_id(order.id).one(&state.orm).await?.unwrap();
    assert_eq!(stored.khalti_pidx.as_deref(), Some(first.pidx.as_str()));

    // Once it expires a new session takes its place.
    set_session(&sessions, &first.pidx, "Expired", 500_000);
    let second = payment_service::initialize_payment(&state, &shopper, start())
        .await?
        .data
        .unwrap();
    assert_ne!(second.pidx, first.pidx);

    let missing = payment_service::complete_payment(&state, CompletePaymentQuery {
        pidx: Some("  ".into()),
        ..returning("")
    })
    .await;
    assert!(matches!(missing, Err(AppError::BadRequest(_))));

    let unknown = payment_service::complete_payment(&state, returning("pidx-unknown")).await;
    assert!(matches!(unknown, Err(AppError::Upstream(_))));

    set_session(&sessions, &second.pidx, "Pending", 500_000);
    let pending = payment_service::complete_payment(&state, returning(&second.pidx)).await?;
    assert!(!pending.success);
    assert_eq!(pending.message, "Payment not completed: Pending");

    set_session(&sessions, &second.pidx, "Completed", 100);
    let short = payment_service::complete_payment(&state, returning(&second.pidx)).await?;
    assert!(!short.success);
    let unpaid = Orders::find_by_id(order.id).one(&state.orm).await?.unwrap();
    assert_eq!(unpaid.payment_status, PaymentStatus::Unpaid);

    set_session(&sessions, &second.pidx, "Completed", 500_000);
    let paid = payment_service::complete_payment(&state, returning(&second.pidx)).await?;
    assert!(paid.success);
    let outcome = paid.data.unwrap();
    assert_eq!(outcome.payment_status, PaymentStatus::Paid);
    assert_eq!(outcome.transaction_id.as_deref(), Some("txn-77"));

    let repeat = payment_service::complete_payment(&state, returning(&second.pidx)).await?;
    assert_eq!(repeat.message, "Payment already verified");

    let after_paid = payment_service::initialize_payment(&state, &shopper, start()).await;
    assert!(matches!(after_paid, Err(AppError::BadRequest(ref m)) if m == "Order already paid"));
    Ok(())
}
