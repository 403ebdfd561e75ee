use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};

use crate::{
    dto::wishlist::{WishlistRequest, WishlistView},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Product,
    response::ApiResponse,
    services::wishlist_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add", post(add_to_wishlist))
        .route("/get_wishlist", get(get_wishlist))
        .route("/remove", put(remove_from_wishlist))
}

#[utoipa::path(
    post,
    path = "/api/wishlist/add",
    request_body = WishlistRequest,
    responses(
        (status = 200, description = "Product is on the wishlist", body = ApiResponse<Product>),
        (status = 400, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<WishlistRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = wishlist_service::add_to_wishlist(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/wishlist/get_wishlist",
    responses((status = 200, description = "Wishlisted products", body = ApiResponse<WishlistView>)),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn get_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<WishlistView>>> {
    let resp = wishlist_service::get_wishlist(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/wishlist/remove",
    request_body = WishlistRequest,
    responses(
        (status = 200, description = "Removed from wishlist"),
        (status = 404, description = "Product was not on the wishlist"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<WishlistRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = wishlist_service::remove_from_wishlist(&state, &user, payload).await?;
    Ok(Json(resp))
}
