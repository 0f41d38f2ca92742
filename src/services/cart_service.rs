use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{LockType, OnConflict};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{
        AddToCartRequest, MAX_LINE_QUANTITY, MergeCartRequest, MergeCartResponse,
        UpdateCartItemRequest,
    },
    entity::{
        CartItems, Carts, Products,
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol},
        carts::{ActiveModel as CartActive, Column as CartCol, Model as CartModel},
        products::Model as ProductModel,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem, Inventory},
    pricing::{subtotal, unit_price},
    response::{ApiResponse, Meta},
    services::mapping::cart_item_from_entity,
    state::AppState,
};

/// How an add-to-cart product reference resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductRef {
    Persisted(Uuid),
    Sample(String),
}

pub fn resolve_product_ref(raw: &str, allow_samples: bool) -> AppResult<ProductRef> {
    let raw = raw.trim();
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(ProductRef::Persisted(id));
    }
    if allow_samples && raw.starts_with("sample") {
        return Ok(ProductRef::Sample(raw.to_string()));
    }
    Err(AppError::bad_request("Invalid product id"))
}

fn build_cart(user_id: Uuid, cart_id: Option<Uuid>, items: Vec<CartItem>) -> Cart {
    let total_price = subtotal(items.iter().map(|i| (i.price, i.quantity)));
    let item_count = items
        .iter()
        .fold(0i32, |count, i| count.saturating_add(i.quantity));
    Cart {
        id: cart_id,
        user_id,
        items,
        total_price,
        item_count,
    }
}

fn inventory_of(product: &ProductModel) -> Inventory {
    Inventory {
        quantity: product.inventory_quantity,
        track_quantity: product.track_quantity,
    }
}

fn ensure_stock(product: &ProductModel, quantity: i32) -> AppResult<()> {
    if !inventory_of(product).can_fulfil(quantity) {
        return Err(AppError::bad_request("Insufficient stock"));
    }
    Ok(())
}

async fn load_items<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<Vec<CartItem>> {
    Ok(CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(cart_item_from_entity)
        .collect())
}

/// The user's cart, or an empty unsaved one.
pub async fn load_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Cart> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?;
    match cart {
        Some(cart) => {
            let items = load_items(conn, cart.id).await?;
            Ok(build_cart(user_id, Some(cart.id), items))
        }
        None => Ok(build_cart(user_id, None, Vec::new())),
    }
}

/// Lock the user's cart row, creating it on first use.
async fn lock_cart(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<CartModel> {
    Carts::insert(CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_price: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    })
    .on_conflict(OnConflict::column(CartCol::UserId).do_nothing().to_owned())
    .exec_without_returning(txn)
    .await?;

    Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart vanished for user {user_id}")))
}

async fn existing_cart(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<CartModel> {
    Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Cart"))
}

/// Recompute and store the cart total from its items.
async fn save_total(txn: &DatabaseTransaction, cart: CartModel) -> AppResult<Cart> {
    let items = load_items(txn, cart.id).await?;
    let view = build_cart(cart.user_id, Some(cart.id), items);

    let mut active: CartActive = cart.into();
    active.total_price = Set(view.total_price);
    active.updated_at = Set(Utc::now().into());
    active.update(txn).await?;
    Ok(view)
}

/// Lock a product row for the stock check; it must be on sale.
async fn active_product(txn: &DatabaseTransaction, id: Uuid) -> AppResult<ProductModel> {
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;
    if !product.is_active {
        return Err(AppError::bad_request("Product is not available"));
    }
    Ok(product)
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let cart = load_cart(&state.orm, user.user_id).await?;
    Ok(ApiResponse::success("Cart", cart, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<Cart>> {
    let product_id =
        match resolve_product_ref(&payload.product_id, state.config.allow_sample_products)? {
            ProductRef::Persisted(id) => id,
            ProductRef::Sample(reference) => {
                tracing::debug!(reference = %reference, "sample product added to cart");
                return Ok(ApiResponse::success(
                    "Sample item added to cart (not saved)",
                    sample_cart(user.user_id, &reference, payload.quantity),
                    None,
                ));
            }
        };

    let txn = state.orm.begin().await?;
    let cart = lock_cart(&txn, user.user_id).await?;
    let product = active_product(&txn, product_id).await?;

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .one(&txn)
        .await?;

    match existing {
        Some(item) => {
            let quantity = combined_quantity(item.quantity, payload.quantity)?;
            ensure_stock(&product, quantity)?;
            let mut active: CartItemActive = item.into();
            active.quantity = Set(quantity);
            active.update(&txn).await?;
        }
        None => {
            ensure_stock(&product, payload.quantity)?;
            new_line(&product, cart.id, payload.quantity)
                .insert(&txn)
                .await?;
        }
    }

    let view = save_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        "carts",
        serde_json::json!({ "product_id": product_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Item added to cart", view, None))
}

fn new_line(product: &ProductModel, cart_id: Uuid, quantity: i32) -> CartItemActive {
    let image = product
        .images
        .as_array()
        .and_then(|images| images.first())
        .and_then(|first| first.as_str())
        .map(str::to_string);
    CartItemActive {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart_id),
        product_id: Set(product.id),
        name: Set(product.name.clone()),
        price: Set(unit_price(product.price, product.discounted_price)),
        image: Set(image),
        quantity: Set(quantity),
        created_at: NotSet,
    }
}

fn sample_cart(user_id: Uuid, reference: &str, quantity: i32) -> Cart {
    let item = CartItem {
        id: Uuid::new_v4(),
        product_id: Uuid::nil(),
        name: format!("Sample product ({reference})"),
        price: 0,
        image: None,
        quantity,
    };
    build_cart(user_id, None, vec![item])
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;
    let cart = existing_cart(&txn, user.user_id).await?;

    let item = CartItems::find_by_id(item_id)
        .filter(CartItemCol::CartId.eq(cart.id))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Cart item"))?;

    let product = active_product(&txn, item.product_id).await?;
    ensure_stock(&product, payload.quantity)?;

    let mut active: CartItemActive = item.into();
    active.quantity = Set(payload.quantity);
    active.update(&txn).await?;

    let view = save_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        "carts",
        serde_json::json!({ "item_id": item_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Cart updated", view, None))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;
    let cart = existing_cart(&txn, user.user_id).await?;

    let result = CartItems::delete_many()
        .filter(CartItemCol::Id.eq(item_id))
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("Cart item"));
    }

    let view = save_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        "carts",
        serde_json::json!({ "item_id": item_id }),
    )
    .await;

    Ok(ApiResponse::success("Item removed from cart", view, None))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let view = match cart {
        Some(cart) => {
            CartItems::delete_many()
                .filter(CartItemCol::CartId.eq(cart.id))
                .exec(&txn)
                .await?;
            save_total(&txn, cart).await?
        }
        None => build_cart(user.user_id, None, Vec::new()),
    };
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        "carts",
        serde_json::json!({}),
    )
    .await;

    Ok(ApiResponse::success("Cart cleared", view, None))
}

/// Fold a guest cart into the persisted one, clamping to available stock.
pub async fn merge_cart(
    state: &AppState,
    user: &AuthUser,
    payload: MergeCartRequest,
) -> AppResult<ApiResponse<MergeCartResponse>> {
    let txn = state.orm.begin().await?;
    let cart = lock_cart(&txn, user.user_id).await?;
    let mut skipped = Vec::new();

    for guest in payload.items {
        let Ok(ProductRef::Persisted(product_id)) = resolve_product_ref(&guest.product_id, false)
        else {
            skipped.push(guest.product_id);
            continue;
        };
        let product = match Products::find_by_id(product_id).one(&txn).await? {
            Some(p) if p.is_active => p,
            _ => {
                skipped.push(guest.product_id);
                continue;
            }
        };

        let existing = CartItems::find()
            .filter(CartItemCol::CartId.eq(cart.id))
            .filter(CartItemCol::ProductId.eq(product_id))
            .one(&txn)
            .await?;
        let current = existing.as_ref().map_or(0, |item| item.quantity);
        let target = merged_quantity(current, guest.quantity, inventory_of(&product));
        if target <= current {
            skipped.push(guest.product_id);
            continue;
        }

        match existing {
            Some(item) => {
                let mut active: CartItemActive = item.into();
                active.quantity = Set(target);
                active.update(&txn).await?;
            }
            None => {
                new_line(&product, cart.id, target).insert(&txn).await?;
            }
        }
    }

    let view = save_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_merge",
        "carts",
        serde_json::json!({ "skipped": skipped.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart merged",
        MergeCartResponse {
            cart: view,
            skipped,
        },
        None,
    ))
}

/// Line quantity after adding `incoming` to what the cart already holds.
pub fn combined_quantity(current: i32, incoming: i32) -> AppResult<i32> {
    current
        .checked_add(incoming)
        .filter(|total| *total <= MAX_LINE_QUANTITY)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Quantity cannot exceed {MAX_LINE_QUANTITY} per item"
            ))
        })
}

/// Quantity after adding `incoming` to `current`, capped by tracked stock
/// and the per-line limit.
pub fn merged_quantity(current: i32, incoming: i32, inventory: Inventory) -> i32 {
    let wanted = current
        .saturating_add(incoming)
        .min(MAX_LINE_QUANTITY.max(current));
    if inventory.track_quantity {
        wanted.min(inventory.quantity.max(current))
    } else {
        wanted
    }
}
