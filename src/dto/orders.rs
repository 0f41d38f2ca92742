use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Order, OrderStatus, PaymentMethod, ShippingAddress};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct OrderItemRequest {
    pub product: Uuid,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateOrderRequest {
    #[validate(nested)]
    pub order_items: Vec<OrderItemRequest>,
    #[validate(nested)]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct PayOrderRequest {
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "Payment status is required"))]
    pub status: String,
    #[validate(length(min = 1, message = "Update time is required"))]
    pub update_time: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: "62701".into(),
            country: "US".into(),
        }
    }

    #[test]
    fn nested_item_and_address_errors_are_reported() {
        let req = CreateOrderRequest {
            order_items: vec![OrderItemRequest {
                product: Uuid::new_v4(),
                quantity: 0,
            }],
            shipping_address: ShippingAddress {
                city: String::new(),
                ..address()
            },
            payment_method: PaymentMethod::CreditCard,
            notes: None,
        };
        let err: crate::error::AppError = req.validate().unwrap_err().into();
        let crate::error::AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["order_items[0].quantity", "shipping_address.city"]);
    }

    #[test]
    fn payment_method_is_a_closed_set() {
        let json = serde_json::json!({
            "order_items": [],
            "shipping_address": address(),
            "payment_method": "barter",
        });
        assert!(serde_json::from_value::<CreateOrderRequest>(json).is_err());
    }
}
