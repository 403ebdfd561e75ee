use axum::{Router, routing::get};

use crate::{middleware::rate_limit::RateLimiters, security_log::SecurityLogger, state::AppState};

pub mod cart;
pub mod doc;
pub mod health;
pub mod khalti;
pub mod logs;
pub mod orders;
pub mod params;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlist;

/// The `/api` router. User routes carry their own auth, registration and
/// password-reset tiers; payment routes use the payment tier; the rest share
/// the api tier. State is provided at the top level.
pub fn create_api_router(limiters: &RateLimiters, security: &SecurityLogger) -> Router<AppState> {
    let api_tier = |router: Router<AppState>| limiters.api.apply(router, security);

    Router::new()
        .nest("/user", users::router(limiters, security))
        .nest("/product", api_tier(products::router()))
        .nest("/cart", api_tier(cart::router()))
        .nest("/wishlist", api_tier(wishlist::router()))
        .nest("/review", api_tier(reviews::router()))
        .nest("/order", api_tier(orders::router()))
        .nest("/logs", api_tier(logs::router()))
        .nest("/khalti", limiters.payment.apply(khalti::router(), security))
        .route("/status/rate-limits", get(health::rate_limit_status))
}
