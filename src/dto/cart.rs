use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{entity::cart_items::CartStatus, models::CartItem};

fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "one")]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartItem>,
    /// Sum of price x quantity over active items, in paisa.
    pub total: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartStatusRequest {
    pub status: CartStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartStatusUpdated {
    pub updated: u64,
}
