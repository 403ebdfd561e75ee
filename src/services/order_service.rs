use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithItems, PlaceOrderRequest, UpdateOrderStatusRequest},
    entity::{
        cart_items::{CartStatus, Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
            OrderStatus, PaymentStatus,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::cart_service::priced_total,
    state::AppState,
};

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Loads the line items of every order in one query and pairs them up.
async fn attach_items<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
) -> AppResult<Vec<OrderWithItems>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    if !ids.is_empty() {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(ids))
            .order_by_asc(OrderItemCol::CreatedAt)
            .all(conn)
            .await?;
        for item in items {
            grouped
                .entry(item.order_id)
                .or_default()
                .push(OrderItem::from(item));
        }
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderWithItems {
            items: grouped.remove(&order.id).unwrap_or_default(),
            order: Order::from(order),
        })
        .collect())
}

pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let street = required("street", &payload.street)?;
    let city = required("city", &payload.city)?;
    let phone = required("phone", &payload.phone)?;

    let txn = state.orm.begin().await?;

    let rows = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Status.eq(CartStatus::Active))
        .order_by_asc(CartCol::CreatedAt)
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    if rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    // Row locks on the products keep concurrent orders from overselling.
    let product_ids: Vec<Uuid> = rows.iter().map(|item| item.product_id).collect();
    let mut products: HashMap<Uuid, _> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let mut lines = Vec::with_capacity(rows.len());
    for item in rows {
        let product = products.remove(&item.product_id).ok_or_else(|| {
            AppError::BadRequest("A product in your cart is no longer available".into())
        })?;
        if product.quantity < item.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
        lines.push((item, product));
    }
    let total_price = priced_total(
        lines
            .iter()
            .map(|(item, product)| (product.price, item.quantity)),
    )
    .ok_or_else(|| AppError::BadRequest("Order total is out of range".into()))?;

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total_price: Set(total_price),
        status: Set(OrderStatus::Pending),
        payment_method: Set(payload.payment_method),
        payment_status: Set(PaymentStatus::Unpaid),
        street: Set(street),
        city: Set(city),
        phone: Set(phone),
        khalti_pidx: Set(None),
        transaction_id: Set(None),
        paid_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (cart_item, product) in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(product.id)),
            product_name: Set(product.name.clone()),
            unit_price: Set(product.price),
            quantity: Set(cart_item.quantity),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(item));

        Products::update_many()
            .col_expr(ProdCol::Quantity, Expr::col(ProdCol::Quantity).sub(cart_item.quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(now))
            .filter(ProdCol::Id.eq(product.id))
            .exec(&txn)
            .await?;
    }

    let cart_ids: Vec<Uuid> = lines.iter().map(|(item, _)| item.id).collect();
    CartItems::update_many()
        .col_expr(CartCol::Status, Expr::value(CartStatus::Ordered))
        .col_expr(CartCol::UpdatedAt, Expr::value(now))
        .filter(CartCol::Id.is_in(cart_ids))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, user_id = %user.user_id, total_price, "order placed");
    Ok(ApiResponse::success(
        "Order placed successfully",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_orders_by_user(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<OrderList>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;
    let orders = attach_items(&state.orm, orders).await?;

    let meta = Meta::listing(orders.len());
    Ok(ApiResponse::success(
        "OK",
        OrderList { orders },
        Some(meta),
    ))
}

pub async fn get_single_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    // Other users' orders look missing rather than forbidden.
    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::NotFound);
    }

    let mut found = attach_items(&state.orm, vec![order]).await?;
    let order = found.pop().ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("OK", order, Some(Meta::empty())))
}

pub async fn get_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(raw) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = OrderStatus::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid order status: {raw}")))?;
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let orders = attach_items(&state.orm, orders).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderList { orders },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Admin status change. Cancelling returns the line items to stock; a
/// cancelled order cannot be moved to any other status.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let next = OrderStatus::parse(&payload.status).ok_or_else(|| {
        AppError::BadRequest(format!("Invalid order status: {}", payload.status))
    })?;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = order.status;

    if previous == OrderStatus::Cancelled && next != OrderStatus::Cancelled {
        return Err(AppError::BadRequest(
            "Cancelled orders cannot change status".into(),
        ));
    }

    let now = Utc::now();
    if next == OrderStatus::Cancelled && previous != OrderStatus::Cancelled {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(&txn)
            .await?;
        for item in items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            Products::update_many()
                .col_expr(ProdCol::Quantity, Expr::col(ProdCol::Quantity).add(item.quantity))
                .col_expr(ProdCol::UpdatedAt, Expr::value(now))
                .filter(ProdCol::Id.eq(product_id))
                .exec(&txn)
                .await?;
        }
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    let mut found = attach_items(&txn, vec![order]).await?;
    txn.commit().await?;
    let order = found.pop().ok_or(AppError::NotFound)?;

    tracing::info!(
        order_id = %id,
        admin = %user.user_id,
        from = previous.as_str(),
        to = next.as_str(),
        "order status updated"
    );
    Ok(ApiResponse::success(
        "Order status updated",
        order,
        Some(Meta::empty()),
    ))
}
