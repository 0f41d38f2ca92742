use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{InventoryAdjustRequest, ProductList},
    entity::{
        Products,
        products::{ActiveModel as ProductActive, Column as ProdCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::LowStockQuery,
    services::{mapping::product_from_entity, product_service::with_reviews},
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(
            Condition::all()
                .add(ProdCol::TrackQuantity.eq(true))
                .add(ProdCol::InventoryQuantity.lte(threshold)),
        )
        .order_by_asc(ProdCol::InventoryQuantity)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| product_from_entity(model, Vec::new()))
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", ProductList { items }, Some(meta)))
}

/// New quantity after a signed adjustment; stock never goes below zero.
pub fn adjusted_quantity(current: i32, delta: i32) -> AppResult<i32> {
    if delta == 0 {
        return Err(AppError::bad_request("delta must not be 0"));
    }
    let next = current
        .checked_add(delta)
        .ok_or_else(|| AppError::bad_request("Inventory adjustment out of range"))?;
    if next < 0 {
        return Err(AppError::bad_request("Inventory cannot be negative"));
    }
    Ok(next)
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let quantity = adjusted_quantity(product.inventory_quantity, payload.delta)?;

    let mut active: ProductActive = product.into();
    active.inventory_quantity = Set(quantity);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;
    let product = with_reviews(&txn, updated).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": id, "delta": payload.delta, "quantity": quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        product,
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_never_goes_negative() {
        assert_eq!(adjusted_quantity(5, -5).unwrap(), 0);
        assert_eq!(adjusted_quantity(5, 10).unwrap(), 15);
        assert!(adjusted_quantity(5, -6).is_err());
        assert!(adjusted_quantity(5, 0).is_err());
        assert!(adjusted_quantity(i32::MAX, 1).is_err());
    }
}
