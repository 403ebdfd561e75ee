use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    models::Product,
    routes::params::{ProductSortBy, SortOrder},
    uploads::UploadedImage,
};

/// Multipart form accepted by product create and update. Text fields are
/// optional here; create checks that the required ones are present.
#[derive(Debug, Default)]
pub struct ProductForm {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub material: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub image: Option<UploadedImage>,
}

/// OpenAPI shape of [`ProductForm`].
#[derive(Deserialize, ToSchema)]
pub struct ProductUpload {
    #[serde(rename = "productName")]
    pub name: String,
    /// Price in paisa.
    #[serde(rename = "productPrice")]
    pub price: i64,
    #[serde(rename = "productCategory")]
    pub category: String,
    #[serde(rename = "productMaterial")]
    pub material: Option<String>,
    #[serde(rename = "productDescription")]
    pub description: String,
    #[serde(rename = "productQuantity")]
    pub quantity: i32,
    #[serde(rename = "productImage")]
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub products: Vec<Product>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductPageQuery {
    pub page: Option<i64>,
    pub category: Option<String>,
    pub material: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FilterQuery {
    pub category: Option<String>,
    pub material: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}
