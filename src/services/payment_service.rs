use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::payments::{
        ConfirmPaymentRequest, ConfirmPaymentResponse, CreatePaymentIntentRequest,
        PaymentIntentResponse, RefundRequest,
    },
    entity::{
        Orders, Payments,
        payments::{ActiveModel as PaymentActive, Column as PaymentCol},
    },
    error::{AppError, AppResult},
    gateway::{GatewayError, IntentStatus},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Payment, PaymentResult, PaymentStatus},
    response::{ApiResponse, Meta},
    services::{
        mapping::{payment_from_entity, payment_status},
        order_service::{check_payable, mark_paid, order_view},
    },
    state::AppState,
};

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnknownIntent(_) => AppError::not_found("Payment intent"),
            GatewayError::InvalidAmount
            | GatewayError::RefundTooLarge { .. }
            | GatewayError::NotCaptured(_) => AppError::BadRequest(err.to_string()),
            GatewayError::Unavailable(_) => AppError::Internal(anyhow::anyhow!(err)),
        }
    }
}

/// Payment status recorded for a processor intent status.
pub fn status_for(intent: IntentStatus) -> PaymentStatus {
    match intent {
        IntentStatus::Succeeded => PaymentStatus::Completed,
        IntentStatus::Processing => PaymentStatus::Processing,
        IntentStatus::RequiresConfirmation | IntentStatus::Canceled => PaymentStatus::Failed,
    }
}

/// Refund amount after defaults, checked against what was captured.
pub fn refund_amount(requested: Option<i64>, captured: i64) -> AppResult<i64> {
    let amount = requested.unwrap_or(captured);
    if amount <= 0 {
        return Err(AppError::bad_request("Refund amount must be positive"));
    }
    if amount > captured {
        return Err(AppError::bad_request(
            "Refund amount cannot exceed the payment amount",
        ));
    }
    Ok(amount)
}

/// Whether a payment in this state still holds the order.
///
/// Failed and refunded payments leave room for a new attempt; the others
/// are either awaiting confirmation or have already captured money.
pub fn holds_order(status: PaymentStatus) -> bool {
    matches!(
        status,
        PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Completed
    )
}

async fn ensure_no_open_payment(txn: &DatabaseTransaction, order_id: Uuid) -> AppResult<()> {
    let payments = Payments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .all(txn)
        .await?;
    for payment in &payments {
        if holds_order(payment_status(payment)?) {
            return Err(AppError::bad_request(
                "Order already has a payment in progress",
            ));
        }
    }
    Ok(())
}

pub async fn create_payment_intent(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentIntentRequest,
) -> AppResult<ApiResponse<PaymentIntentResponse>> {
    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(payload.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .filter(|order| order.user_id == user.user_id)
        .ok_or_else(|| AppError::not_found("Order"))?;
    check_payable(&order)?;
    ensure_no_open_payment(&txn, order.id).await?;

    let currency = state.config.payment_currency.as_str();
    let intent = state
        .gateway
        .create_intent(order.id, order.total_price, currency)
        .await?;

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        user_id: Set(user.user_id),
        transaction_id: Set(intent.id.clone()),
        amount: Set(intent.amount),
        currency: Set(intent.currency.clone()),
        status: Set(PaymentStatus::Pending.as_str().to_string()),
        refund_amount: Set(None),
        refund_reason: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "payment_intent_create",
        "payments",
        serde_json::json!({ "payment_id": payment.id, "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment intent created",
        PaymentIntentResponse {
            payment_id: payment.id,
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
        },
        Some(Meta::empty()),
    ))
}

/// Confirm (capture) an intent and mark its order paid.
///
/// The payment and order rows stay locked across the processor call, and
/// the order is checked before anything is captured.
pub async fn confirm_payment(
    state: &AppState,
    user: &AuthUser,
    payload: ConfirmPaymentRequest,
) -> AppResult<ApiResponse<ConfirmPaymentResponse>> {
    let txn = state.orm.begin().await?;
    let payment = Payments::find()
        .filter(PaymentCol::TransactionId.eq(payload.payment_intent_id.as_str()))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .filter(|payment| user.can_access(payment.user_id))
        .ok_or_else(|| AppError::not_found("Payment"))?;
    match payment_status(&payment)? {
        PaymentStatus::Completed => {
            return Err(AppError::bad_request("Payment already completed"));
        }
        PaymentStatus::Refunded => {
            return Err(AppError::bad_request("Payment has been refunded"));
        }
        _ => {}
    }
    let order = Orders::find_by_id(payment.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    check_payable(&order)?;

    let intent = state.gateway.confirm_intent(&payment.transaction_id).await?;
    let status = status_for(intent.status);

    let order = if status == PaymentStatus::Completed {
        let result = PaymentResult {
            id: intent.id.clone(),
            status: "succeeded".into(),
            update_time: Utc::now().to_rfc3339(),
            email_address: Some(user.email.clone()),
        };
        mark_paid(&txn, order, result).await?
    } else {
        order
    };

    let mut active: PaymentActive = payment.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let payment = active.update(&txn).await?;

    let order = order_view(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(
        payment_id = %payment.id,
        order_id = %order.id,
        status = status.as_str(),
        "payment confirmed"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "payment_confirm",
        "payments",
        serde_json::json!({ "payment_id": payment.id, "status": status.as_str() }),
    )
    .await;

    let message = match status {
        PaymentStatus::Completed => "Payment confirmed",
        PaymentStatus::Processing => "Payment is processing",
        _ => "Payment failed",
    };
    Ok(ApiResponse::success(
        message,
        ConfirmPaymentResponse {
            payment: payment_from_entity(payment)?,
            order,
        },
        Some(Meta::empty()),
    ))
}

pub async fn refund_payment(
    state: &AppState,
    user: &AuthUser,
    payload: RefundRequest,
) -> AppResult<ApiResponse<Payment>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let payment = Payments::find_by_id(payload.payment_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;
    if payment_status(&payment)? != PaymentStatus::Completed {
        return Err(AppError::bad_request(
            "Only completed payments can be refunded",
        ));
    }
    let amount = refund_amount(payload.amount, payment.amount)?;

    state.gateway.refund(&payment.transaction_id, amount).await?;

    let mut active: PaymentActive = payment.into();
    active.status = Set(PaymentStatus::Refunded.as_str().to_string());
    active.refund_amount = Set(Some(amount));
    active.refund_reason = Set(payload.reason);
    active.updated_at = Set(Utc::now().into());
    let payment = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(payment_id = %payment.id, amount, "payment refunded");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "payment_refund",
        "payments",
        serde_json::json!({ "payment_id": payment.id, "amount": amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Refund processed",
        payment_from_entity(payment)?,
        Some(Meta::empty()),
    ))
}

pub async fn get_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let payment = Payments::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|payment| user.can_access(payment.user_id))
        .ok_or_else(|| AppError::not_found("Payment"))?;
    Ok(ApiResponse::success(
        "Payment",
        payment_from_entity(payment)?,
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_statuses_map_onto_payment_statuses() {
        assert_eq!(status_for(IntentStatus::Succeeded), PaymentStatus::Completed);
        assert_eq!(status_for(IntentStatus::Processing), PaymentStatus::Processing);
        assert_eq!(status_for(IntentStatus::Canceled), PaymentStatus::Failed);
        assert_eq!(
            status_for(IntentStatus::RequiresConfirmation),
            PaymentStatus::Failed
        );
    }

    #[test]
    fn refunds_default_to_the_full_amount() {
        assert_eq!(refund_amount(None, 17_280).unwrap(), 17_280);
        assert_eq!(refund_amount(Some(500), 17_280).unwrap(), 500);
        assert!(refund_amount(Some(17_281), 17_280).is_err());
        assert!(refund_amount(Some(0), 17_280).is_err());
    }

    #[test]
    fn only_failed_or_refunded_payments_free_the_order() {
        assert!(holds_order(PaymentStatus::Pending));
        assert!(holds_order(PaymentStatus::Processing));
        assert!(holds_order(PaymentStatus::Completed));
        assert!(!holds_order(PaymentStatus::Failed));
        assert!(!holds_order(PaymentStatus::Refunded));
    }

    #[test]
    fn gateway_errors_map_to_http_statuses() {
        use axum::http::StatusCode;
        let not_found: AppError = GatewayError::UnknownIntent("pi_x".into()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        let bad: AppError = GatewayError::NotCaptured("pi_x".into()).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        let down: AppError = GatewayError::Unavailable("timeout".into()).into();
        assert_eq!(down.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
