use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartStatusUpdated, CartView, UpdateCartStatusRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::CartItem,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add_to_cart", post(add_to_cart))
        .route("/get_cart", get(get_cart))
        .route("/remove_from_cart/{id}", put(remove_from_cart))
        .route("/update_status", put(update_status))
}

#[utoipa::path(
    post,
    path = "/api/cart/add_to_cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added or quantity merged", body = ApiResponse<CartItem>),
        (status = 400, description = "Invalid quantity, unknown product or not enough stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_service::add_to_cart(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/cart/get_cart",
    responses((status = 200, description = "Active cart with total", body = ApiResponse<CartView>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let resp = cart_service::get_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/cart/remove_from_cart/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Removed from cart"),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::remove_from_cart(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/cart/update_status",
    request_body = UpdateCartStatusRequest,
    responses((status = 200, description = "Active items moved to ordered", body = ApiResponse<CartStatusUpdated>)),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateCartStatusRequest>,
) -> AppResult<Json<ApiResponse<CartStatusUpdated>>> {
    let resp = cart_service::update_status(&state, &user, payload).await?;
    Ok(Json(resp))
}
