use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};

use crate::{
    dto::cart::{AddToCartRequest, MergeCartRequest, MergeCartResponse, UpdateCartItemRequest},
    error::AppResult,
    extract::{ValidatedJson, parse_id},
    middleware::auth::AuthUser,
    models::Cart,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/merge", post(merge_cart))
        .route("/{item_id}", put(update_cart_item).delete(remove_cart_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Current user's cart", body = ApiResponse<Cart>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let response = cart_service::get_cart(&state, &user).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added; quantities for the same product are summed", body = ApiResponse<Cart>),
        (status = 400, description = "Insufficient stock, inactive product or invalid id"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let response = cart_service::add_to_cart(&state, &user, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    put,
    path = "/api/cart/{item_id}",
    params(("item_id" = String, Path, description = "Cart item ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity replaced", body = ApiResponse<Cart>),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let item_id = parse_id(&item_id, "cart item")?;
    let response = cart_service::update_cart_item(&state, &user, item_id, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{item_id}",
    params(("item_id" = String, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<Cart>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let item_id = parse_id(&item_id, "cart item")?;
    let response = cart_service::remove_cart_item(&state, &user, item_id).await?;
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart emptied", body = ApiResponse<Cart>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let response = cart_service::clear_cart(&state, &user).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/cart/merge",
    request_body = MergeCartRequest,
    responses(
        (status = 200, description = "Guest cart merged", body = ApiResponse<MergeCartResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn merge_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<MergeCartRequest>,
) -> AppResult<Json<ApiResponse<MergeCartResponse>>> {
    let response = cart_service::merge_cart(&state, &user, payload).await?;
    Ok(Json(response))
}
