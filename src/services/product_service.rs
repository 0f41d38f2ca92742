use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::LockType;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, CreateReviewRequest, ProductList, UpdateProductRequest},
    entity::{
        Products, Reviews,
        products::{ActiveModel, Column, Model as ProductModel},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    pricing::ratings_from,
    response::{ApiResponse, Deleted, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::mapping::{product_from_entity, review_from_entity},
    state::AppState,
};

const DUPLICATE_SKU: &str = "Product with this SKU already exists";

fn check_discount(price: i64, discounted_price: Option<i64>) -> AppResult<()> {
    match discounted_price {
        Some(discounted) if discounted > price => Err(AppError::bad_request(
            "Discounted price cannot exceed the regular price",
        )),
        _ => Ok(()),
    }
}

fn images_json(images: Vec<String>) -> AppResult<serde_json::Value> {
    serde_json::to_value(images).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}

/// Load a product's reviews (newest first) and build the API view.
pub async fn with_reviews<C: ConnectionTrait>(conn: &C, model: ProductModel) -> AppResult<Product> {
    let reviews = Reviews::find()
        .filter(ReviewCol::ProductId.eq(model.id))
        .order_by_desc(ReviewCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(review_from_entity)
        .collect();
    product_from_entity(model, reviews)
}

pub async fn list_products(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if !viewer.is_some_and(AuthUser::is_admin) {
        condition = condition.add(Column::IsActive.eq(true));
    }

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category) = query.category {
        condition = condition.add(Column::Category.eq(category.as_str()));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if query.in_stock == Some(true) {
        condition = condition.add(
            Condition::any()
                .add(Column::TrackQuantity.eq(false))
                .add(Column::InventoryQuantity.gt(0)),
        );
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
        ProductSortBy::Rating => Column::RatingsAverage,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    // Listings omit reviews; the detail endpoint carries them.
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| product_from_entity(model, Vec::new()))
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<Product>> {
    let model = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|p| p.is_active || viewer.is_some_and(AuthUser::is_admin))
        .ok_or_else(|| AppError::not_found("Product"))?;
    let product = with_reviews(&state.orm, model).await?;
    Ok(ApiResponse::success("Product", product, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    check_discount(payload.price, payload.discounted_price)?;

    let sku = payload.sku.trim().to_uppercase();
    let taken = Products::find()
        .filter(Column::Sku.eq(sku.as_str()))
        .one(&state.orm)
        .await?;
    if taken.is_some() {
        return Err(AppError::bad_request(DUPLICATE_SKU));
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        discounted_price: Set(payload.discounted_price),
        category: Set(payload.category.as_str().to_string()),
        sku: Set(sku),
        images: Set(images_json(payload.images)?),
        inventory_quantity: Set(payload.inventory_quantity),
        track_quantity: Set(payload.track_quantity),
        ratings_average: Set(0.0),
        ratings_count: Set(0),
        is_active: Set(payload.is_active),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active
        .insert(&state.orm)
        .await
        .map_err(|e| AppError::unique_violation(e, DUPLICATE_SKU))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id, "sku": product.sku }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product, Vec::new())?,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let price = payload.price.unwrap_or(existing.price);
    let discounted_price = payload.discounted_price.unwrap_or(existing.discounted_price);
    check_discount(price, discounted_price)?;

    let mut active: ActiveModel = existing.clone().into();
    if let Some(sku) = payload.sku {
        let sku = sku.trim().to_uppercase();
        if sku != existing.sku {
            let taken = Products::find()
                .filter(Column::Sku.eq(sku.as_str()))
                .one(&state.orm)
                .await?;
            if taken.is_some() {
                return Err(AppError::bad_request(DUPLICATE_SKU));
            }
        }
        active.sku = Set(sku);
    }
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(category) = payload.category {
        active.category = Set(category.as_str().to_string());
    }
    if let Some(images) = payload.images {
        active.images = Set(images_json(images)?);
    }
    if let Some(quantity) = payload.inventory_quantity {
        active.inventory_quantity = Set(quantity);
    }
    if let Some(track) = payload.track_quantity {
        active.track_quantity = Set(track);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.price = Set(price);
    active.discounted_price = Set(discounted_price);
    active.updated_at = Set(Utc::now().into());

    let product = active
        .update(&state.orm)
        .await
        .map_err(|e| AppError::unique_violation(e, DUPLICATE_SKU))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let product = with_reviews(&state.orm, product).await?;
    Ok(ApiResponse::success("Product updated", product, Some(Meta::empty())))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Deleted>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Product"));
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product removed",
        Deleted { id },
        Some(Meta::empty()),
    ))
}

pub async fn add_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Product>> {
    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::not_found("Product"))?;

    let already = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .filter(ReviewCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?;
    if already.is_some() {
        return Err(AppError::bad_request("Product already reviewed"));
    }

    ReviewActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        user_id: Set(user.user_id),
        name: Set(user.name.clone()),
        rating: Set(payload.rating),
        comment: Set(payload.comment.trim().to_string()),
        created_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(|e| AppError::unique_violation(e, "Product already reviewed"))?;

    let all_ratings: Vec<i16> = Reviews::find()
        .select_only()
        .column(ReviewCol::Rating)
        .filter(ReviewCol::ProductId.eq(product_id))
        .into_tuple()
        .all(&txn)
        .await?;
    let ratings = ratings_from(all_ratings);

    let mut active: ActiveModel = product.into();
    active.ratings_average = Set(ratings.average);
    active.ratings_count = Set(ratings.count);
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;

    let product = with_reviews(&txn, product).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "review_create",
        "reviews",
        serde_json::json!({ "product_id": product_id, "rating": payload.rating }),
    )
    .await;

    Ok(ApiResponse::success("Review added", product, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_may_not_exceed_price() {
        assert!(check_discount(1_000, None).is_ok());
        assert!(check_discount(1_000, Some(1_000)).is_ok());
        assert!(check_discount(1_000, Some(800)).is_ok());
        let err = check_discount(1_000, Some(1_001)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
