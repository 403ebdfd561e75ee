use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entity::orders::{OrderStatus, PaymentStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitializePaymentRequest {
    pub order_id: Uuid,
    /// Storefront origin Khalti redirects back to; defaults to `FRONTEND_URL`.
    pub website_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InitializedPayment {
    pub order_id: Uuid,
    pub pidx: String,
    pub payment_url: String,
    pub expires_at: Option<String>,
}

/// Query string Khalti appends to the return URL.
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CompletePaymentQuery {
    pub pidx: Option<String>,
    pub status: Option<String>,
    pub transaction_id: Option<String>,
    pub purchase_order_id: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentOutcome {
    pub order_id: Uuid,
    pub pidx: String,
    pub khalti_status: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KhaltiConfigStatus {
    pub secret_key: String,
    pub gateway_url: String,
    pub backend_uri: String,
}
