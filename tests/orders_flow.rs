use std::sync::Arc;

use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::{
        auth::RegisterRequest,
        cart::AddToCartRequest,
        orders::{CreateOrderRequest, OrderItemRequest, PayOrderRequest, UpdateOrderStatusRequest},
        payments::{ConfirmPaymentRequest, CreatePaymentIntentRequest, RefundRequest},
        products::{CreateProductRequest, CreateReviewRequest, UpdateProductRequest},
    },
    error::AppError,
    gateway::{LocalGateway, PaymentGateway},
    middleware::auth::AuthUser,
    models::{Order, OrderStatus, PaymentMethod, PaymentStatus, ProductCategory, Role, ShippingAddress},
    routes::params::LowStockQuery,
    services::{admin_service, auth_service, cart_service, order_service, payment_service, product_service},
    state::AppState,
};
use uuid::Uuid;

// These run against a real Postgres and skip when none is configured.
fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
            None
        }
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE audit_logs, payments, order_items, orders, cart_items, carts, reviews, products, users CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "integration-secret".into(),
        jwt_expiry_days: 1,
        allow_sample_products: false,
        payment_currency: "usd".into(),
    };
    Ok(AppState::new(pool, config).with_gateway(Arc::new(LocalGateway::default())))
}

async fn register(state: &AppState, name: &str, email: &str, role: Role) -> anyhow::Result<AuthUser> {
    let response = auth_service::register_user(
        state,
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: "secret1".into(),
            phone: None,
        },
    )
    .await?;
    let user = response.data.expect("registered user").user;

    if role == Role::Admin {
        sqlx::query("UPDATE users SET role = 'admin' WHERE id = $1")
            .bind(user.id)
            .execute(&state.pool)
            .await?;
    }

    Ok(AuthUser {
        user_id: user.id,
        name: user.name,
        email: user.email,
        role,
    })
}

async fn create_product(
    state: &AppState,
    admin: &AuthUser,
    sku: &str,
    price: i64,
    discounted_price: Option<i64>,
    quantity: i32,
) -> anyhow::Result<Uuid> {
    let response = product_service::create_product(
        state,
        admin,
        CreateProductRequest {
            name: format!("Widget {sku}"),
            description: "A product for testing".into(),
            price,
            discounted_price,
            category: ProductCategory::Electronics,
            sku: sku.into(),
            images: vec![format!("https://img.example.com/{sku}.png")],
            inventory_quantity: quantity,
            track_quantity: true,
            is_active: true,
        },
    )
    .await?;
    Ok(response.data.expect("product").id)
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let (quantity,): (i32,) = sqlx::query_as("SELECT inventory_quantity FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(quantity)
}

fn address() -> ShippingAddress {
    ShippingAddress {
        street: "1 Main St".into(),
        city: "Springfield".into(),
        state: "IL".into(),
        zip_code: "62701".into(),
        country: "US".into(),
    }
}

fn order_with(lines: &[(Uuid, i32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        order_items: lines
            .iter()
            .map(|&(product, quantity)| OrderItemRequest { product, quantity })
            .collect(),
        shipping_address: address(),
        payment_method: PaymentMethod::Stripe,
        notes: None,
    }
}

fn order_for(product: Uuid, quantity: i32) -> CreateOrderRequest {
    order_with(&[(product, quantity)])
}

async fn place_order(state: &AppState, user: &AuthUser, request: CreateOrderRequest) -> anyhow::Result<Order> {
    Ok(order_service::create_order(state, user, request)
        .await?
        .data
        .expect("order"))
}

async fn move_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<Order, AppError> {
    Ok(order_service::update_order_status(state, user, order_id, UpdateOrderStatusRequest { status })
        .await?
        .data
        .expect("order"))
}

fn review(rating: i16) -> CreateReviewRequest {
    CreateReviewRequest {
        rating,
        comment: "Works as described".into(),
    }
}

// Single test function so the shared tables are never truncated mid-flow.
#[tokio::test]
async fn storefront_order_lifecycle() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;

    let admin = register(&state, "Admin", "admin@example.com", Role::Admin).await?;
    let user = register(&state, "Jane", "jane@example.com", Role::User).await?;
    let stranger = register(&state, "Sam", "sam@example.com", Role::User).await?;

    // Duplicate registration
    let err = auth_service::register_user(
        &state,
        RegisterRequest {
            name: "Jane Again".into(),
            email: "jane@example.com".into(),
            password: "secret1".into(),
            phone: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "User already exists"));

    let headphones = create_product(&state, &admin, "ELEC-001", 10_000, Some(8_000), 5).await?;
    let mug = create_product(&state, &admin, "HOME-001", 1_200, None, 2).await?;

    // Cart rejects quantities beyond stock and stays unchanged
    cart_service::add_to_cart(
        &state,
        &user,
        AddToCartRequest {
            product_id: mug.to_string(),
            quantity: 1,
        },
    )
    .await?;
    let err = cart_service::add_to_cart(
        &state,
        &user,
        AddToCartRequest {
            product_id: mug.to_string(),
            quantity: 3,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "Insufficient stock"));
    let cart = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert_eq!(cart.item_count, 1);
    assert_eq!(cart.total_price, 1_200);

    // Oversize order leaves stock and orders untouched
    let err = order_service::create_order(&state, &user, order_for(headphones, 6))
        .await
        .unwrap_err();
    assert!(
        matches!(err, AppError::BadRequest(ref m) if m.starts_with("Insufficient stock for Widget ELEC-001"))
    );
    assert_eq!(stock_of(&state, headphones).await?, 5);
    let (orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(orders, 0);

    // Totals: 2 x 80.00 (discounted from 100.00), 8% tax, free shipping over 100.00
    let order = place_order(&state, &user, order_for(headphones, 2)).await?;
    assert_eq!(order.items[0].price, 8_000);
    assert_eq!(order.items_price, 16_000);
    assert_eq!(order.tax_price, 1_280);
    assert_eq!(order.shipping_price, 0);
    assert_eq!(order.total_price, 17_280);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(stock_of(&state, headphones).await?, 3);

    // Low stock: the mug (2) and the headphones (3) are at or under 5
    let low = admin_service::list_low_stock(
        &state,
        &admin,
        LowStockQuery {
            page: Some(1),
            per_page: Some(20),
            threshold: None,
        },
    )
    .await?
    .data
    .expect("low stock");
    let ids: Vec<Uuid> = low.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![mug, headphones]);

    // Cancelling restores stock exactly once
    let cancelled = move_order(&state, &user, order.id, OrderStatus::Cancelled).await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&state, headphones).await?, 5);

    let err = move_order(&state, &admin, order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(stock_of(&state, headphones).await?, 5);

    // A short line rolls back the reservations made for earlier lines
    let speaker = create_product(&state, &admin, "ELEC-002", 2_000, None, 1).await?;
    let err = order_service::create_order(&state, &user, order_with(&[(headphones, 2), (speaker, 3)]))
        .await
        .unwrap_err();
    assert!(
        matches!(err, AppError::BadRequest(ref m) if m.starts_with("Insufficient stock for Widget ELEC-002"))
    );
    assert_eq!(stock_of(&state, headphones).await?, 5);
    assert_eq!(stock_of(&state, speaker).await?, 1);

    // One open intent per order, and a paid order is never captured again
    let paid_elsewhere = place_order(&state, &user, order_for(headphones, 1)).await?;
    let intent = payment_service::create_payment_intent(
        &state,
        &user,
        CreatePaymentIntentRequest {
            order_id: paid_elsewhere.id,
        },
    )
    .await?
    .data
    .expect("intent");
    let err = payment_service::create_payment_intent(
        &state,
        &user,
        CreatePaymentIntentRequest {
            order_id: paid_elsewhere.id,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "Order already has a payment in progress"));

    order_service::pay_order(
        &state,
        &user,
        paid_elsewhere.id,
        PayOrderRequest {
            id: "PAYPAL-42".into(),
            status: "COMPLETED".into(),
            update_time: "2025-01-01T00:00:00Z".into(),
            email_address: Some("jane@example.com".into()),
        },
    )
    .await?;
    let err = payment_service::confirm_payment(
        &state,
        &user,
        ConfirmPaymentRequest {
            payment_intent_id: intent.payment_intent_id.clone(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "Order is already paid"));
    // Nothing was captured, so there is nothing to refund
    assert!(state.gateway.refund(&intent.payment_intent_id, 1).await.is_err());
    let (status,): (String,) = sqlx::query_as("SELECT status FROM payments WHERE transaction_id = $1")
        .bind(&intent.payment_intent_id)
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(status, "pending");

    // Delivery is reached one step at a time and stamps the order
    assert!(!paid_elsewhere.is_delivered);
    for status in [OrderStatus::Processing, OrderStatus::Shipped] {
        move_order(&state, &admin, paid_elsewhere.id, status).await?;
    }
    let delivered = move_order(&state, &admin, paid_elsewhere.id, OrderStatus::Delivered).await?;
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.is_delivered);
    assert!(delivered.delivered_at.is_some());

    // Payment intent + confirmation marks the order paid
    let order = place_order(&state, &user, order_for(mug, 1)).await?;
    let intent = payment_service::create_payment_intent(
        &state,
        &user,
        CreatePaymentIntentRequest { order_id: order.id },
    )
    .await?
    .data
    .expect("intent");
    assert_eq!(intent.amount, order.total_price);

    let confirmed = payment_service::confirm_payment(
        &state,
        &user,
        ConfirmPaymentRequest {
            payment_intent_id: intent.payment_intent_id.clone(),
        },
    )
    .await?
    .data
    .expect("confirmation");
    assert_eq!(confirmed.payment.status, PaymentStatus::Completed);
    assert!(confirmed.order.is_paid);
    assert!(confirmed.order.paid_at.is_some());

    // Partial refund by an admin
    let refunded = payment_service::refund_payment(
        &state,
        &admin,
        RefundRequest {
            payment_id: confirmed.payment.id,
            amount: Some(500),
            reason: Some("Damaged in transit".into()),
        },
    )
    .await?
    .data
    .expect("refund");
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refund_amount, Some(500));

    // Reviews recompute ratings, once per user, active products only
    product_service::add_review(&state, &user, headphones, review(4)).await?;
    let rated = product_service::add_review(&state, &stranger, headphones, review(5))
        .await?
        .data
        .expect("product");
    assert_eq!(rated.ratings.count, 2);
    assert!((rated.ratings.average - 4.5).abs() < f64::EPSILON);
    assert_eq!(rated.reviews.len(), 2);

    let err = product_service::add_review(&state, &user, headphones, review(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "Product already reviewed"));

    product_service::update_product(
        &state,
        &admin,
        speaker,
        UpdateProductRequest {
            name: None,
            description: None,
            price: None,
            discounted_price: None,
            category: None,
            sku: None,
            images: None,
            inventory_quantity: None,
            track_quantity: None,
            is_active: Some(false),
        },
    )
    .await?;
    let err = product_service::add_review(&state, &user, speaker, review(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Other users cannot see the order
    let err = order_service::get_order(&state, &stranger, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}
