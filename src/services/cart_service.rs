use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartStatusUpdated, CartView, UpdateCartStatusRequest},
    entity::{
        cart_items::{ActiveModel as CartActive, CartStatus, Column as CartCol, Entity as CartItems},
        products::{self, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
    state::AppState,
};

fn cart_item(model: crate::entity::cart_items::Model, product: products::Model) -> CartItem {
    CartItem {
        id: model.id,
        product: Product::from(product),
        quantity: model.quantity,
        status: model.status,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

/// Sum of `price * quantity` over cart or order lines, `None` on overflow.
pub(crate) fn priced_total<I>(lines: I) -> Option<i64>
where
    I: IntoIterator<Item = (i64, i32)>,
{
    lines.into_iter().try_fold(0i64, |total, (price, quantity)| {
        price
            .checked_mul(i64::from(quantity))
            .and_then(|line| total.checked_add(line))
    })
}

fn merged_quantity(existing: i32, added: i32) -> AppResult<i32> {
    existing
        .checked_add(added)
        .ok_or_else(|| AppError::BadRequest("quantity is too large".to_string()))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(payload.product_id))
                .add(CartCol::Status.eq(CartStatus::Active)),
        )
        .one(&state.orm)
        .await?;

    let in_cart = existing.as_ref().map_or(0, |item| item.quantity);
    let requested = merged_quantity(in_cart, payload.quantity)?;
    if requested > product.quantity {
        return Err(AppError::BadRequest(format!(
            "Only {} of {} left in stock",
            product.quantity, product.name
        )));
    }

    let now = Utc::now();
    let saved = match existing {
        Some(item) => {
            let mut active: CartActive = item.into();
            active.quantity = Set(requested);
            active.updated_at = Set(now.into());
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                quantity: Set(requested),
                status: Set(CartStatus::Active),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(&state.orm)
            .await?
        }
    };

    Ok(ApiResponse::success(
        "Added to cart",
        cart_item(saved, product),
        Some(Meta::empty()),
    ))
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let rows = CartItems::find()
        .find_also_related(Products)
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Status.eq(CartStatus::Active))
        .order_by_desc(CartCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let items: Vec<CartItem> = rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|p| cart_item(item, p)))
        .collect();
    let total = priced_total(items.iter().map(|item| (item.product.price, item.quantity)))
        .ok_or_else(|| AppError::BadRequest("Cart total is out of range".to_string()))?;

    let meta = Meta::listing(items.len());
    Ok(ApiResponse::success(
        "OK",
        CartView { items, total },
        Some(meta),
    ))
}

/// Removes one of the caller's active cart rows by cart item id.
pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::Id.eq(id))
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Status.eq(CartStatus::Active))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateCartStatusRequest,
) -> AppResult<ApiResponse<CartStatusUpdated>> {
    if payload.status != CartStatus::Ordered {
        return Err(AppError::BadRequest(
            "Cart items can only be moved to ordered".to_string(),
        ));
    }

    let result = CartItems::update_many()
        .col_expr(CartCol::Status, Expr::value(CartStatus::Ordered))
        .col_expr(CartCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Status.eq(CartStatus::Active))
        .exec(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Cart status updated",
        CartStatusUpdated {
            updated: result.rows_affected,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_every_line() {
        assert_eq!(priced_total([(2_500, 2), (1_000, 3)]), Some(8_000));
        assert_eq!(priced_total(std::iter::empty()), Some(0));
    }

    #[test]
    fn totals_refuse_to_overflow() {
        assert_eq!(priced_total([(i64::MAX / 2, 3)]), None);
        assert_eq!(priced_total([(i64::MAX, 1), (1, 1)]), None);
    }

    #[test]
    fn merged_quantities_reject_overflow() {
        assert_eq!(merged_quantity(3, 4).unwrap(), 7);
        assert!(matches!(
            merged_quantity(i32::MAX, 1),
            Err(AppError::BadRequest(_))
        ));
    }
}
