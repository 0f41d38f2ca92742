use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{auth, cart, orders, payments, products},
    models::{
        Address, Cart, CartItem, Inventory, Order, OrderItem, OrderStatus, Payment,
        PaymentMethod, PaymentResult, PaymentStatus, Product, ProductCategory, Ratings, Review,
        Role, ShippingAddress, User,
    },
    response::{ApiResponse, Deleted, FieldError, Meta},
    routes::{
        admin, auth as auth_routes, cart as cart_routes, health, orders as order_routes, params,
        payments as payment_routes, products as product_routes,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        auth_routes::register,
        auth_routes::login,
        auth_routes::get_profile,
        auth_routes::update_profile,
        auth_routes::list_users,
        auth_routes::update_user,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        product_routes::add_review,
        cart_routes::get_cart,
        cart_routes::add_to_cart,
        cart_routes::update_cart_item,
        cart_routes::remove_cart_item,
        cart_routes::clear_cart,
        cart_routes::merge_cart,
        order_routes::create_order,
        order_routes::my_orders,
        order_routes::list_orders,
        order_routes::get_order,
        order_routes::update_order_status,
        order_routes::pay_order,
        payment_routes::create_payment_intent,
        payment_routes::confirm_payment,
        payment_routes::refund,
        payment_routes::get_payment,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            Role,
            Address,
            User,
            ProductCategory,
            Inventory,
            Ratings,
            Review,
            Product,
            CartItem,
            Cart,
            OrderStatus,
            PaymentMethod,
            ShippingAddress,
            PaymentResult,
            OrderItem,
            Order,
            PaymentStatus,
            Payment,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::UpdateProfileRequest,
            auth::AdminUpdateUserRequest,
            auth::UserList,
            products::CreateProductRequest,
            products::UpdateProductRequest,
            products::CreateReviewRequest,
            products::InventoryAdjustRequest,
            products::ProductList,
            cart::AddToCartRequest,
            cart::UpdateCartItemRequest,
            cart::MergeCartRequest,
            cart::MergeCartResponse,
            orders::OrderItemRequest,
            orders::CreateOrderRequest,
            orders::UpdateOrderStatusRequest,
            orders::PayOrderRequest,
            orders::OrderList,
            payments::CreatePaymentIntentRequest,
            payments::PaymentIntentResponse,
            payments::ConfirmPaymentRequest,
            payments::ConfirmPaymentResponse,
            payments::RefundRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::LowStockQuery,
            Meta,
            FieldError,
            Deleted,
            ApiResponse<Product>,
            ApiResponse<products::ProductList>,
            ApiResponse<Cart>,
            ApiResponse<Order>,
            ApiResponse<orders::OrderList>,
            ApiResponse<Payment>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "Registration, login, profile and user administration"),
        (name = "Products", description = "Catalog and reviews"),
        (name = "Cart", description = "Per-user shopping cart"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Payments", description = "Payment intents, confirmation and refunds"),
        (name = "Admin", description = "Inventory administration"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
