use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::payments::{
        ConfirmPaymentRequest, ConfirmPaymentResponse, CreatePaymentIntentRequest,
        PaymentIntentResponse, RefundRequest,
    },
    error::AppResult,
    extract::{ValidatedJson, parse_id},
    middleware::auth::AuthUser,
    models::Payment,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/confirm-payment", post(confirm_payment))
        .route("/refund", post(refund))
        .route("/{id}", get(get_payment))
}

#[utoipa::path(
    post,
    path = "/api/payments/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 201, description = "Intent created", body = ApiResponse<PaymentIntentResponse>),
        (status = 400, description = "Order already paid or cancelled"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<CreatePaymentIntentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<PaymentIntentResponse>>)> {
    let response = payment_service::create_payment_intent(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/api/payments/confirm-payment",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment status after confirmation", body = ApiResponse<ConfirmPaymentResponse>),
        (status = 400, description = "Payment already completed"),
        (status = 404, description = "Payment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<ConfirmPaymentRequest>,
) -> AppResult<Json<ApiResponse<ConfirmPaymentResponse>>> {
    let response = payment_service::confirm_payment(&state, &user, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/payments/refund",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund recorded (admin only)", body = ApiResponse<Payment>),
        (status = 400, description = "Payment not refundable or amount too large"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn refund(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<RefundRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::refund_payment(&state, &user, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    params(("id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<Payment>),
        (status = 404, description = "Payment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let id = parse_id(&id, "payment")?;
    let response = payment_service::get_payment(&state, &user, id).await?;
    Ok(Json(response))
}
