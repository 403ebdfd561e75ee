use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};

use crate::{
    dto::khalti::{
        CompletePaymentQuery, InitializePaymentRequest, InitializedPayment, KhaltiConfigStatus,
        PaymentOutcome,
    },
    entity::{
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
            OrderStatus, PaymentMethod, PaymentStatus,
        },
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    khalti::{CustomerInfo, InitiateRequest, KhaltiError, LookupResponse},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

const RETURN_PATH: &str = "/api/khalti/complete-khalti-payment";

/// Lookup states in which an earlier session can still settle.
const LIVE_SESSION_STATES: [&str; 3] = ["Initiated", "Pending", "Completed"];

/// Refuses a new session while the order's previous one is still live, so its
/// payment URL is never orphaned by an overwritten `pidx`.
fn ensure_no_live_session(previous: &LookupResponse) -> AppResult<()> {
    if LIVE_SESSION_STATES.contains(&previous.status.as_str()) {
        return Err(AppError::Conflict(format!(
            "A Khalti payment for this order is already {}",
            previous.status.to_lowercase()
        )));
    }
    Ok(())
}

fn outcome(order: &OrderModel, lookup: &LookupResponse) -> PaymentOutcome {
    PaymentOutcome {
        order_id: order.id,
        pidx: lookup.pidx.clone(),
        khalti_status: lookup.status.clone(),
        status: order.status,
        payment_status: order.payment_status,
        transaction_id: order.transaction_id.clone(),
        paid_at: order.paid_at.map(|dt| dt.with_timezone(&Utc)),
    }
}

pub async fn initialize_payment(
    state: &AppState,
    user: &AuthUser,
    payload: InitializePaymentRequest,
) -> AppResult<ApiResponse<InitializedPayment>> {
    let order = Orders::find_by_id(payload.order_id)
        .one(&state.orm)
        .await?
        .filter(|o| o.user_id == user.user_id)
        .ok_or(AppError::NotFound)?;

    if order.payment_method != PaymentMethod::Khalti {
        return Err(AppError::BadRequest(
            "Order is not set up for Khalti payment".into(),
        ));
    }
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::BadRequest("Order has been cancelled".into()));
    }
    if order.payment_status == PaymentStatus::Paid {
        return Err(AppError::BadRequest("Order already paid".into()));
    }

    if let Some(pidx) = order.khalti_pidx.as_deref() {
        match state.khalti.lookup(pidx).await {
            Ok(previous) => ensure_no_live_session(&previous)?,
            // Khalti no longer knows the session; a fresh one is safe.
            Err(KhaltiError::Rejected(detail)) => {
                tracing::info!(pidx, %detail, "previous khalti session unknown");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let backend = state
        .config
        .khalti
        .backend_uri
        .as_deref()
        .ok_or_else(|| AppError::internal("BACKEND_URI environment variable is not set"))?;
    let customer = Users::find_by_id(user.user_id).one(&state.orm).await?;

    let details = InitiateRequest {
        return_url: format!("{}{RETURN_PATH}", backend.trim_end_matches('/')),
        website_url: payload
            .website_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| state.config.khalti.website_url.clone()),
        amount: order.total_price,
        purchase_order_id: order.id.to_string(),
        purchase_order_name: format!("SparkleNest order {}", &order.id.simple().to_string()[..8]),
        customer_info: customer.map(|c| CustomerInfo {
            name: format!("{} {}", c.first_name, c.last_name),
            email: c.email,
            phone: c.phone,
        }),
    };
    let session = state.khalti.initiate(&details).await?;

    let order_id = order.id;
    let mut active: OrderActive = order.into();
    active.khalti_pidx = Set(Some(session.pidx.clone()));
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Khalti payment initialized",
        InitializedPayment {
            order_id,
            pidx: session.pidx,
            payment_url: session.payment_url,
            expires_at: session.expires_at,
        },
        Some(Meta::empty()),
    ))
}

/// Verifies a returning payment with Khalti. Only a `Completed` lookup whose
/// amount equals the order total marks the order paid; anything else is
/// reported back with `success: false` and leaves the order untouched.
pub async fn complete_payment(
    state: &AppState,
    query: CompletePaymentQuery,
) -> AppResult<ApiResponse<PaymentOutcome>> {
    let pidx = query
        .pidx
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required field: pidx".into()))?;

    let lookup = state.khalti.lookup(pidx).await?;

    let txn = state.orm.begin().await?;
    let order = Orders::find()
        .filter(OrderCol::KhaltiPidx.eq(pidx))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.payment_status == PaymentStatus::Paid {
        txn.commit().await?;
        return Ok(ApiResponse::success(
            "Payment already verified",
            outcome(&order, &lookup),
            Some(Meta::empty()),
        ));
    }

    if !lookup.is_completed() {
        txn.commit().await?;
        tracing::info!(pidx, status = %lookup.status, "khalti payment not completed");
        return Ok(ApiResponse::failure(
            format!("Payment not completed: {}", lookup.status),
            Some(outcome(&order, &lookup)),
        ));
    }

    if lookup.total_amount != order.total_price {
        txn.commit().await?;
        tracing::warn!(
            pidx,
            expected = order.total_price,
            received = lookup.total_amount,
            "khalti amount mismatch"
        );
        return Ok(ApiResponse::failure(
            "Payment amount does not match the order total",
            Some(outcome(&order, &lookup)),
        ));
    }

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.payment_status = Set(PaymentStatus::Paid);
    active.transaction_id = Set(lookup
        .transaction_id
        .clone()
        .or(query.transaction_id.clone()));
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, pidx, "khalti payment verified");
    Ok(ApiResponse::success(
        "Payment verified successfully",
        outcome(&order, &lookup),
        Some(Meta::empty()),
    ))
}

fn presence(value: bool) -> &'static str {
    if value { "Set" } else { "Not set" }
}

pub fn config_status(state: &AppState) -> ApiResponse<KhaltiConfigStatus> {
    let khalti = &state.config.khalti;
    ApiResponse::success(
        "Khalti configuration",
        KhaltiConfigStatus {
            secret_key: presence(khalti.secret_key.is_some()).to_string(),
            gateway_url: khalti
                .gateway_url
                .clone()
                .unwrap_or_else(|| presence(false).to_string()),
            backend_uri: khalti
                .backend_uri
                .clone()
                .unwrap_or_else(|| presence(false).to_string()),
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::AppConfig;

    fn previous_session(status: &str) -> LookupResponse {
        LookupResponse {
            pidx: "pidx-1".into(),
            total_amount: 250_000,
            status: status.into(),
            transaction_id: None,
            fee: None,
            refunded: None,
        }
    }

    #[test]
    fn live_sessions_block_a_second_initiation() {
        for status in ["Initiated", "Pending", "Completed"] {
            let err = ensure_no_live_session(&previous_session(status)).unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)), "{status} should block");
        }
    }

    #[test]
    fn dead_sessions_allow_a_fresh_initiation() {
        for status in ["Expired", "User canceled", "Refunded"] {
            assert!(ensure_no_live_session(&previous_session(status)).is_ok());
        }
    }

    #[tokio::test]
    async fn config_status_never_exposes_the_secret() {
        let mut config = AppConfig::for_tests("secret");
        config.khalti.secret_key = Some(SecretString::from("live_secret_key_123".to_string()));
        config.khalti.gateway_url = Some("https://dev.khalti.com".into());
        let state = AppState::without_database(config).expect("state");

        let status = config_status(&state).data.expect("data");
        assert_eq!(status.secret_key, "Set");
        assert_eq!(status.gateway_url, "https://dev.khalti.com");
        assert_eq!(status.backend_uri, "Not set");
    }
}
