use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Product, ProductCategory};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Product name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 2000, message = "Description must be between 1 and 2000 characters"))]
    pub description: String,
    /// Cents.
    #[validate(range(min = 0, message = "Price must be a positive number"))]
    pub price: i64,
    #[validate(range(min = 0, message = "Discounted price must be a positive number"))]
    pub discounted_price: Option<i64>,
    pub category: ProductCategory,
    #[validate(length(min = 1, max = 64, message = "SKU is required"))]
    pub sku: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Inventory quantity cannot be negative"))]
    pub inventory_quantity: i32,
    #[serde(default = "default_true")]
    pub track_quantity: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Product name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 2000, message = "Description must be between 1 and 2000 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Price must be a positive number"))]
    pub price: Option<i64>,
    /// `Some(None)` clears the discount.
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub discounted_price: Option<Option<i64>>,
    pub category: Option<ProductCategory>,
    #[validate(length(min = 1, max = 64, message = "SKU is required"))]
    pub sku: Option<String>,
    pub images: Option<Vec<String>>,
    #[validate(range(min = 0, message = "Inventory quantity cannot be negative"))]
    pub inventory_quantity: Option<i32>,
    pub track_quantity: Option<bool>,
    pub is_active: Option<bool>,
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(min = 1, max = 1000, message = "Comment must be between 1 and 1000 characters"))]
    pub comment: String,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_can_be_cleared_or_left_alone() {
        let absent: UpdateProductRequest = serde_json::from_str(r#"{"name":"Lamp"}"#).unwrap();
        assert_eq!(absent.discounted_price, None);

        let cleared: UpdateProductRequest =
            serde_json::from_str(r#"{"discounted_price":null}"#).unwrap();
        assert_eq!(cleared.discounted_price, Some(None));

        let set: UpdateProductRequest =
            serde_json::from_str(r#"{"discounted_price":800}"#).unwrap();
        assert_eq!(set.discounted_price, Some(Some(800)));
    }

    #[test]
    fn create_defaults_to_tracked_and_active() {
        let req: CreateProductRequest = serde_json::from_str(
            r#"{"name":"Lamp","description":"Warm light","price":2500,"category":"home","sku":"LMP-1"}"#,
        )
        .unwrap();
        assert!(req.track_quantity);
        assert!(req.is_active);
        assert_eq!(req.inventory_quantity, 0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn review_rating_is_bounded() {
        let review = CreateReviewRequest {
            rating: 6,
            comment: "great".into(),
        };
        assert!(review.validate().is_err());
    }
}
