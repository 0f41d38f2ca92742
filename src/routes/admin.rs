use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};

use crate::{
    dto::products::{InventoryAdjustRequest, ProductList},
    error::AppResult,
    extract::{ValidatedJson, parse_id},
    middleware::auth::AuthUser,
    models::Product,
    response::ApiResponse,
    routes::params::LowStockQuery,
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory/low-stock", get(list_low_stock))
        .route("/inventory/{id}", patch(adjust_inventory))
}

#[utoipa::path(
    get,
    path = "/api/admin/inventory/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Tracked products at or below the threshold", body = ApiResponse<ProductList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let response = admin_service::list_low_stock(&state, &user, query).await?;
    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/api/admin/inventory/{id}",
    params(("id" = String, Path, description = "Product ID")),
    request_body = InventoryAdjustRequest,
    responses(
        (status = 200, description = "Inventory adjusted", body = ApiResponse<Product>),
        (status = 400, description = "Adjustment would make stock negative"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<InventoryAdjustRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let id = parse_id(&id, "product")?;
    let response = admin_service::adjust_inventory(&state, &user, id, payload).await?;
    Ok(Json(response))
}
