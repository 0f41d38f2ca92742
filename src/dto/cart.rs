use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::Cart;

/// Largest quantity a single cart or order line may hold.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct AddToCartRequest {
    /// A product id, or a `sample…` reference when sample products are enabled.
    #[validate(length(min = 1, message = "Product is required"))]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct MergeCartRequest {
    #[validate(nested)]
    pub items: Vec<AddToCartRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MergeCartResponse {
    pub cart: Cart,
    /// References that were not merged (unknown, inactive, sample or out of stock).
    pub skipped: Vec<String>,
}
