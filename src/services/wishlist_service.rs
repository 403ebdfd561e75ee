use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    dto::wishlist::{WishlistRequest, WishlistView},
    entity::{
        products::Entity as Products,
        wishlist_items::{ActiveModel as WishlistActive, Column as WishCol, Entity as WishlistItems},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Adding a product that is already on the wishlist is a no-op.
pub async fn add_to_wishlist(
    state: &AppState,
    user: &AuthUser,
    payload: WishlistRequest,
) -> AppResult<ApiResponse<Product>> {
    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Product not found".into()))?;

    let existing = WishlistItems::find()
        .filter(WishCol::UserId.eq(user.user_id))
        .filter(WishCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;

    let message = if existing.is_some() {
        "Product already in wishlist"
    } else {
        WishlistActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(payload.product_id),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await?;
        "Added to wishlist"
    };

    Ok(ApiResponse::success(
        message,
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn get_wishlist(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<WishlistView>> {
    let products: Vec<Product> = WishlistItems::find()
        .find_also_related(Products)
        .filter(WishCol::UserId.eq(user.user_id))
        .order_by_desc(WishCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(_, product)| product.map(Product::from))
        .collect();

    let meta = Meta::listing(products.len());
    Ok(ApiResponse::success(
        "OK",
        WishlistView { products },
        Some(meta),
    ))
}

pub async fn remove_from_wishlist(
    state: &AppState,
    user: &AuthUser,
    payload: WishlistRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = WishlistItems::delete_many()
        .filter(WishCol::UserId.eq(user.user_id))
        .filter(WishCol::ProductId.eq(payload.product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Removed from wishlist",
        serde_json::json!({ "product_id": payload.product_id }),
        Some(Meta::empty()),
    ))
}
