#![allow(dead_code)]

use axum::{Router, body::to_bytes, response::Response};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use serde_json::Value;
use uuid::Uuid;

use sparklenest_api::{
    build_app,
    config::{AppConfig, RateLimitConfig},
    db::{create_orm_conn, pool_of, run_migrations},
    entity::{
        products::{self, Entity as Products},
        users,
    },
    middleware::{
        auth::{AuthUser, issue_token},
        rate_limit::RateLimiters,
    },
    state::AppState,
};

pub const JWT_SECRET: &str = "integration-test-secret";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::for_tests(JWT_SECRET);
    config.security_log_path =
        std::env::temp_dir().join(format!("sparklenest-security-{}.log", Uuid::new_v4()));
    config
}

/// Full router over a state whose database never connects.
pub fn offline_app(config: AppConfig, limits: &RateLimitConfig) -> Router {
    let state = AppState::without_database(config).expect("state");
    let limiters = RateLimiters::from_config(limits).expect("limiters");
    build_app(state, &limiters)
}

pub fn account(role: &str) -> users::Model {
    let now = Utc::now().fixed_offset();
    users::Model {
        id: Uuid::new_v4(),
        first_name: "Test".into(),
        last_name: "Shopper".into(),
        user_name: format!("{role}-{}", Uuid::new_v4().simple()),
        email: format!("{role}@sparklenest.test"),
        phone: "9800000000".into(),
        password_hash: String::new(),
        role: role.into(),
        profile_picture: None,
        is_verified: true,
        otp_hash: None,
        otp_purpose: None,
        otp_expires_at: None,
        otp_attempts: 0,
        failed_login_attempts: 0,
        locked_until: None,
        password_changed_at: now,
        created_at: now,
        updated_at: now,
    }
}

pub fn bearer_for(user: &users::Model) -> String {
    let secret = secrecy::SecretString::from(JWT_SECRET.to_string());
    let token = issue_token(&secret, 1, user).expect("token");
    format!("Bearer {token}")
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Migrated state over `TEST_DATABASE_URL`, or `None` when it is not set.
pub async fn database_state(mut config: AppConfig) -> anyhow::Result<Option<AppState>> {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("Skipping test: set TEST_DATABASE_URL to run database flows.");
        return Ok(None);
    };
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&pool_of(&orm)).await?;
    config.database_url = database_url;
    Ok(Some(AppState::new(orm, config)?))
}

pub async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let mut account = account(role);
    account.email = format!("{}@sparklenest.test", Uuid::new_v4().simple());
    account.password_hash = "unused".into();
    let user = account.into_active_model().insert(&state.orm).await?;

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
        email: user.email,
        user_name: user.user_name,
    })
}

pub async fn create_product(state: &AppState, price: i64, quantity: i32) -> anyhow::Result<products::Model> {
    let now = Utc::now().fixed_offset();
    let product = products::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Test Bangle {}", Uuid::new_v4().simple())),
        price: Set(price),
        category: Set("Jewelry".into()),
        material: Set(Some("Gold".into())),
        description: Set("Hand polished bangle".into()),
        image: Set("test.png".into()),
        quantity: Set(quantity),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

pub async fn stock_of(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product vanished"))?;
    Ok(product.quantity)
}
