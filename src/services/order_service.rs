use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CreateOrderRequest, OrderList, PayOrderRequest, UpdateOrderStatusRequest},
    entity::{
        OrderItems, Orders, Products,
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as OrderEntity, Model as OrderModel},
        products::{ActiveModel as ProductActive, Column as ProdCol, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus, PaymentResult},
    pricing::{OrderTotals, tracking_number, unit_price},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::mapping::{order_from_entity, order_status},
    state::AppState,
};

pub async fn order_items_of<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItemModel>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?)
}

pub async fn order_view<C: ConnectionTrait>(conn: &C, model: OrderModel) -> AppResult<Order> {
    let items = order_items_of(conn, model.id).await?;
    order_from_entity(model, items)
}

/// Fetch an order the caller may see. Other users' orders read as missing.
pub async fn find_visible_order<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
    id: Uuid,
    lock: bool,
) -> AppResult<OrderModel> {
    let mut finder = Orders::find_by_id(id);
    if lock {
        finder = finder.lock(LockType::Update);
    }
    finder
        .one(conn)
        .await?
        .filter(|order| user.can_access(order.user_id))
        .ok_or_else(|| AppError::not_found("Order"))
}

fn first_image(product: &ProductModel) -> Option<String> {
    product
        .images
        .as_array()
        .and_then(|images| images.first())
        .and_then(|first| first.as_str())
        .map(str::to_string)
}

/// Check one requested line against a locked product and take it from stock.
fn reserve(product: &mut ProductModel, requested: i32) -> AppResult<()> {
    if !product.is_active {
        return Err(AppError::bad_request(format!(
            "Product {} is not available",
            product.name
        )));
    }
    if product.track_quantity {
        if product.inventory_quantity < requested {
            return Err(AppError::bad_request(format!(
                "Insufficient stock for {}. Available: {}, Requested: {}",
                product.name, product.inventory_quantity, requested
            )));
        }
        product.inventory_quantity -= requested;
    }
    Ok(())
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    if payload.order_items.is_empty() {
        return Err(AppError::bad_request("No order items"));
    }

    let txn = state.orm.begin().await?;

    // Lock every referenced product in id order so concurrent checkouts cannot deadlock.
    let mut product_ids: Vec<Uuid> = payload.order_items.iter().map(|i| i.product).collect();
    product_ids.sort();
    product_ids.dedup();
    let mut products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let order_id = Uuid::new_v4();
    let mut lines = Vec::with_capacity(payload.order_items.len());
    let mut priced = Vec::with_capacity(payload.order_items.len());
    for requested in &payload.order_items {
        let product = products
            .get_mut(&requested.product)
            .ok_or_else(|| AppError::not_found("Product"))?;
        reserve(product, requested.quantity)?;

        let price = unit_price(product.price, product.discounted_price);
        priced.push((price, requested.quantity));
        lines.push(OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product.id),
            name: Set(product.name.clone()),
            price: Set(price),
            image: Set(first_image(product)),
            quantity: Set(requested.quantity),
            created_at: NotSet,
        });
    }

    let totals = OrderTotals::from_lines(priced);

    let shipping_address = serde_json::to_value(&payload.shipping_address)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        shipping_address: Set(shipping_address),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        payment_result: Set(None),
        items_price: Set(totals.items_price),
        tax_price: Set(totals.tax_price),
        shipping_price: Set(totals.shipping_price),
        total_price: Set(totals.total_price),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        is_paid: Set(false),
        paid_at: Set(None),
        is_delivered: Set(false),
        delivered_at: Set(None),
        tracking_number: Set(tracking_number(Utc::now())),
        notes: Set(payload.notes),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for line in lines {
        line.insert(&txn).await?;
    }

    for product in products.into_values() {
        if product.track_quantity {
            let quantity = product.inventory_quantity;
            let mut active: ProductActive = product.into();
            active.inventory_quantity = Set(quantity);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;
        }
    }

    let order = order_view(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, total = order.total_price, "order placed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_create",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "tracking_number": order.tracking_number,
            "total_price": order.total_price,
        }),
    )
    .await;

    Ok(ApiResponse::success("Order created", order, Some(Meta::empty())))
}

async fn page_of_orders(
    state: &AppState,
    finder: Select<OrderEntity>,
    query: &OrderListQuery,
) -> AppResult<(Vec<Order>, Meta)> {
    let (page, limit, offset) = query.pagination().normalize();
    let finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
    for item in OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(ids))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(&state.orm)
        .await?
    {
        items_by_order.entry(item.order_id).or_default().push(item);
    }

    let orders = orders
        .into_iter()
        .map(|order| {
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            order_from_entity(order, items)
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok((orders, Meta::new(page, limit, total)))
}

pub async fn my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    let (items, meta) = page_of_orders(state, Orders::find().filter(condition), &query).await?;
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    let (items, meta) = page_of_orders(state, Orders::find().filter(condition), &query).await?;
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let order = find_visible_order(&state.orm, user, id, false).await?;
    let order = order_view(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", order, None))
}

/// Whether `user` may move an order from `from` to `to`.
pub fn check_transition(user: &AuthUser, from: OrderStatus, to: OrderStatus) -> AppResult<()> {
    if from == to {
        return Err(AppError::bad_request(format!(
            "Order is already {}",
            to.as_str()
        )));
    }
    if !from.can_transition_to(to) {
        return Err(AppError::bad_request(format!(
            "Cannot change order status from {} to {}",
            from.as_str(),
            to.as_str()
        )));
    }
    if !user.is_admin() && !(from == OrderStatus::Pending && to == OrderStatus::Cancelled) {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Put every tracked line item back into stock.
async fn restore_inventory(txn: &DatabaseTransaction, order_id: Uuid) -> AppResult<()> {
    let items = order_items_of(txn, order_id).await?;
    let mut product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    product_ids.sort();
    product_ids.dedup();

    let mut products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    for item in &items {
        match products.get_mut(&item.product_id) {
            Some(product) if product.track_quantity => {
                product.inventory_quantity += item.quantity;
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    order_id = %order_id,
                    product_id = %item.product_id,
                    "cancelled line refers to a deleted product"
                );
            }
        }
    }

    for product in products.into_values().filter(|p| p.track_quantity) {
        let quantity = product.inventory_quantity;
        let mut active: ProductActive = product.into();
        active.inventory_quantity = Set(quantity);
        active.updated_at = Set(Utc::now().into());
        active.update(txn).await?;
    }
    Ok(())
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;
    let existing = find_visible_order(&txn, user, id, true).await?;
    let from = order_status(&existing)?;
    let to = payload.status;
    check_transition(user, from, to)?;

    if to == OrderStatus::Cancelled {
        restore_inventory(&txn, existing.id).await?;
    }

    let now = Utc::now();
    let mut active: OrderActive = existing.into();
    active.status = Set(to.as_str().to_string());
    if to == OrderStatus::Delivered {
        active.is_delivered = Set(true);
        active.delivered_at = Set(Some(now.into()));
    }
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    let order = order_view(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, from = from.as_str(), to = to.as_str(), "order status changed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": from.as_str(), "to": to.as_str() }),
    )
    .await;

    Ok(ApiResponse::success("Order status updated", order, Some(Meta::empty())))
}

/// Reasons an order cannot take a payment.
pub fn check_payable(order: &OrderModel) -> AppResult<()> {
    if order.is_paid {
        return Err(AppError::bad_request("Order is already paid"));
    }
    if order.status == OrderStatus::Cancelled.as_str() {
        return Err(AppError::bad_request("Cannot pay for a cancelled order"));
    }
    Ok(())
}

/// Flag a locked order as paid with the processor's result.
pub async fn mark_paid(
    txn: &DatabaseTransaction,
    order: OrderModel,
    result: PaymentResult,
) -> AppResult<OrderModel> {
    check_payable(&order)?;
    let result =
        serde_json::to_value(result).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.is_paid = Set(true);
    active.paid_at = Set(Some(now.into()));
    active.payment_result = Set(Some(result));
    active.updated_at = Set(now.into());
    Ok(active.update(txn).await?)
}

pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;
    let order = find_visible_order(&txn, user, id, true).await?;
    let result = PaymentResult {
        id: payload.id,
        status: payload.status,
        update_time: payload.update_time,
        email_address: payload.email_address,
    };
    let order = mark_paid(&txn, order, result).await?;
    let order = order_view(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_paid",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success("Order paid", order, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::FixedOffset;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role,
        }
    }

    fn product(quantity: i32, track: bool) -> ProductModel {
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap());
        ProductModel {
            id: Uuid::new_v4(),
            name: "Lamp".into(),
            description: "Desk lamp".into(),
            price: 10_000,
            discounted_price: Some(8_000),
            category: "home".into(),
            sku: "LAMP-1".into(),
            images: serde_json::json!(["lamp.png"]),
            inventory_quantity: quantity,
            track_quantity: track,
            ratings_average: 0.0,
            ratings_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reserving_decrements_tracked_stock_only() {
        let mut tracked = product(5, true);
        reserve(&mut tracked, 2).unwrap();
        assert_eq!(tracked.inventory_quantity, 3);

        let mut untracked = product(0, false);
        reserve(&mut untracked, 50).unwrap();
        assert_eq!(untracked.inventory_quantity, 0);
    }

    #[test]
    fn oversize_request_is_rejected_without_mutation() {
        let mut tracked = product(1, true);
        let err = reserve(&mut tracked, 2).unwrap_err();
        let AppError::BadRequest(message) = err else {
            panic!("expected bad request");
        };
        assert_eq!(message, "Insufficient stock for Lamp. Available: 1, Requested: 2");
        assert_eq!(tracked.inventory_quantity, 1);
    }

    #[test]
    fn inactive_products_cannot_be_ordered() {
        let mut p = product(5, true);
        p.is_active = false;
        assert!(matches!(reserve(&mut p, 1), Err(AppError::BadRequest(_))));
        assert_eq!(p.inventory_quantity, 5);
    }

    #[test]
    fn admins_follow_the_state_machine() {
        let admin = caller(Role::Admin);
        use OrderStatus::*;
        assert!(check_transition(&admin, Pending, Processing).is_ok());
        assert!(check_transition(&admin, Shipped, Cancelled).is_ok());
        assert!(check_transition(&admin, Pending, Shipped).is_err());
        assert!(check_transition(&admin, Cancelled, Cancelled).is_err());
        assert!(check_transition(&admin, Delivered, Cancelled).is_err());
    }

    #[test]
    fn owners_may_only_cancel_pending_orders() {
        let owner = caller(Role::User);
        use OrderStatus::*;
        assert!(check_transition(&owner, Pending, Cancelled).is_ok());
        assert!(matches!(
            check_transition(&owner, Processing, Cancelled),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            check_transition(&owner, Pending, Processing),
            Err(AppError::Forbidden)
        ));
    }
}
