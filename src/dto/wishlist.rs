use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct WishlistRequest {
    #[serde(alias = "id")]
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistView {
    pub products: Vec<Product>,
}
