use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entity::orders::PaymentMethod,
    models::{Order, OrderItem},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    pub street: String,
    pub city: String,
    pub phone: String,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub orders: Vec<OrderWithItems>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// One of Pending, Shipped, Delivered, Cancelled (case-insensitive).
    pub status: String,
}
