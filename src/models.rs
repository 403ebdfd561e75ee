use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    cart_items::CartStatus,
    order_items, orders,
    orders::{OrderStatus, PaymentMethod, PaymentStatus},
    products, reviews, users,
};

/// Public view of an account. Credentials and OTP state never leave the service.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub is_admin: bool,
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            is_admin: model.is_admin(),
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            user_name: model.user_name,
            email: model.email,
            phone: model.phone,
            role: model.role,
            profile_picture: model.profile_picture,
            is_verified: model.is_verified,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Unit price in paisa.
    pub price: i64,
    pub category: String,
    pub material: Option<String>,
    pub description: String,
    pub image: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            price: model.price,
            category: model.category,
            material: model.material,
            description: model.description,
            image: model.image,
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub rating: i16,
    pub review: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<reviews::Model> for Review {
    fn from(model: reviews::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            product_id: model.product_id,
            rating: model.rating,
            review: model.review,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_price: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub street: String,
    pub city: String,
    pub phone: String,
    pub khalti_pidx: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total_price: model.total_price,
            status: model.status,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            street: model.street,
            city: model.city,
            phone: model.phone,
            khalti_pidx: model.khalti_pidx,
            transaction_id: model.transaction_id,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            line_total: model.line_total(),
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            product_name: model.product_name,
            unit_price: model.unit_price,
            quantity: model.quantity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub username: String,
    pub url: String,
    pub method: String,
    pub role: String,
    pub status: String,
    pub user_agent: Option<String>,
    pub authorization: String,
    pub content_type: String,
    pub device: String,
    pub ip_address: String,
    #[serde(rename = "time")]
    pub created_at: DateTime<Utc>,
}
