use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Order, Payment};

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreatePaymentIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub payment_id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, message = "Payment intent id is required"))]
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmPaymentResponse {
    pub payment: Payment,
    pub order: Order,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct RefundRequest {
    pub payment_id: Uuid,
    /// Defaults to the full payment amount.
    #[validate(range(min = 1, message = "Refund amount must be positive"))]
    pub amount: Option<i64>,
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
}
