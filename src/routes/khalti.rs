use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::khalti::{
        CompletePaymentQuery, InitializePaymentRequest, InitializedPayment, KhaltiConfigStatus,
        PaymentOutcome,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initialize-khalti", post(initialize_khalti))
        .route("/complete-khalti-payment", get(complete_khalti_payment))
        .route("/test-khalti", get(test_khalti))
}

#[utoipa::path(
    post,
    path = "/api/khalti/initialize-khalti",
    request_body = InitializePaymentRequest,
    responses(
        (status = 200, description = "Khalti payment session created", body = ApiResponse<InitializedPayment>),
        (status = 400, description = "Order cannot be paid with Khalti"),
        (status = 404, description = "Order not found"),
        (status = 502, description = "Khalti rejected the request"),
    ),
    security(("bearer_auth" = [])),
    tag = "Khalti"
)]
pub async fn initialize_khalti(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<InitializePaymentRequest>,
) -> AppResult<Json<ApiResponse<InitializedPayment>>> {
    let resp = payment_service::initialize_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/khalti/complete-khalti-payment",
    params(CompletePaymentQuery),
    responses(
        (status = 200, description = "Payment verified", body = ApiResponse<PaymentOutcome>),
        (status = 400, description = "Payment not completed or amount mismatch", body = ApiResponse<PaymentOutcome>),
        (status = 404, description = "No order for this pidx"),
    ),
    tag = "Khalti"
)]
pub async fn complete_khalti_payment(
    State(state): State<AppState>,
    Query(query): Query<CompletePaymentQuery>,
) -> AppResult<(StatusCode, Json<ApiResponse<PaymentOutcome>>)> {
    let resp = payment_service::complete_payment(&state, query).await?;
    let status = if resp.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/khalti/test-khalti",
    responses((status = 200, description = "Which Khalti settings are present", body = ApiResponse<KhaltiConfigStatus>)),
    tag = "Khalti"
)]
pub async fn test_khalti(State(state): State<AppState>) -> Json<ApiResponse<KhaltiConfigStatus>> {
    Json(payment_service::config_status(&state))
}
