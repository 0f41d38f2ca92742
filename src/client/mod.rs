//! Client-side state for applications consuming the storefront API.
//!
//! Mirrors what a browser front end keeps locally: a session ([`AuthStore`]),
//! an optimistic cart ([`CartStore`]) and the multi-step checkout
//! ([`CheckoutFlow`]). State transitions go through plain reducers so they can
//! be tested without a server; the stores add persistence and API calls on top.

pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod storage;

pub use api::{HttpApi, StorefrontApi};
pub use auth::{AuthAction, AuthState, AuthStore};
pub use cart::{CartAction, CartState, CartStore, LocalCartItem};
pub use checkout::{CheckoutFlow, CheckoutStep};
pub use storage::{FileStorage, MemoryStorage, Storage};

use thiserror::Error;

/// Errors surfaced by the client library.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: connection refused, timeout, TLS.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error envelope.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// 401 or 403; the stored token should not be reused.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested operation does not fit the current local state.
    #[error("{0}")]
    Invalid(String),
}

impl ClientError {
    /// The server rejected the credentials themselves.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }

    /// Message suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } | ClientError::Unauthorized(message) => {
                message.clone()
            }
            ClientError::Http(_) => "Unable to reach the server".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::{ClientError, api::StorefrontApi};
    use crate::{
        dto::{
            auth::{AuthResponse, RegisterRequest},
            cart::{AddToCartRequest, MergeCartRequest, MergeCartResponse},
            orders::CreateOrderRequest,
        },
        models::{Cart, CartItem, Order, OrderStatus, Role, User},
        pricing::OrderTotals,
    };

    pub fn user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            phone: None,
            addresses: Vec::new(),
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// How the fake answers profile requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ProfileReply {
        Ok,
        Unauthorized,
        ServerError,
    }

    /// In-memory stand-in for the HTTP API.
    pub struct FakeApi {
        pub profile: Mutex<ProfileReply>,
        pub cart_fails: Mutex<bool>,
        pub cart: Mutex<Vec<CartItem>>,
        /// Products the server refuses to merge.
        pub unavailable: Mutex<Vec<Uuid>>,
        pub calls: Mutex<Vec<String>>,
        pub user: User,
    }

    impl FakeApi {
        pub fn new() -> Self {
            Self {
                profile: Mutex::new(ProfileReply::Ok),
                cart_fails: Mutex::new(false),
                cart: Mutex::new(Vec::new()),
                unavailable: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                user: user(),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn cart_view(&self) -> Cart {
            let items = self.cart.lock().unwrap().clone();
            Cart {
                id: Some(Uuid::nil()),
                user_id: self.user.id,
                total_price: items.iter().map(|i| i.price * i64::from(i.quantity)).sum(),
                item_count: items.iter().map(|i| i.quantity).sum(),
                items,
            }
        }

        fn check_cart(&self) -> Result<(), ClientError> {
            if *self.cart_fails.lock().unwrap() {
                return Err(ClientError::Api {
                    status: 500,
                    message: "Internal Server Error".into(),
                });
            }
            Ok(())
        }

        fn upsert(&self, product_id: &str, quantity: i32) {
            let product_id = Uuid::parse_str(product_id).unwrap();
            let mut cart = self.cart.lock().unwrap();
            match cart.iter_mut().find(|i| i.product_id == product_id) {
                Some(item) => item.quantity += quantity,
                None => cart.push(CartItem {
                    id: Uuid::new_v4(),
                    product_id,
                    name: "Server product".into(),
                    price: 1_000,
                    image: None,
                    quantity,
                }),
            }
        }
    }

    #[async_trait]
    impl StorefrontApi for FakeApi {
        async fn register(&self, _request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
            self.record("register");
            Ok(AuthResponse {
                token: "token-1".into(),
                user: self.user.clone(),
            })
        }

        async fn login(&self, _email: &str, password: &str) -> Result<AuthResponse, ClientError> {
            self.record("login");
            if password != "secret1" {
                return Err(ClientError::Unauthorized("Invalid email or password".into()));
            }
            Ok(AuthResponse {
                token: "token-1".into(),
                user: self.user.clone(),
            })
        }

        async fn profile(&self, _token: &str) -> Result<User, ClientError> {
            self.record("profile");
            match *self.profile.lock().unwrap() {
                ProfileReply::Ok => Ok(self.user.clone()),
                ProfileReply::Unauthorized => {
                    Err(ClientError::Unauthorized("Not authorized, token failed".into()))
                }
                ProfileReply::ServerError => Err(ClientError::Api {
                    status: 503,
                    message: "Service Unavailable".into(),
                }),
            }
        }

        async fn get_cart(&self, _token: &str) -> Result<Cart, ClientError> {
            self.record("get_cart");
            self.check_cart()?;
            Ok(self.cart_view())
        }

        async fn add_to_cart(
            &self,
            _token: &str,
            request: &AddToCartRequest,
        ) -> Result<Cart, ClientError> {
            self.record("add_to_cart");
            self.check_cart()?;
            self.upsert(&request.product_id, request.quantity);
            Ok(self.cart_view())
        }

        async fn update_cart_item(
            &self,
            _token: &str,
            item_id: Uuid,
            quantity: i32,
        ) -> Result<Cart, ClientError> {
            self.record("update_cart_item");
            self.check_cart()?;
            if let Some(item) = self.cart.lock().unwrap().iter_mut().find(|i| i.id == item_id) {
                item.quantity = quantity;
            }
            Ok(self.cart_view())
        }

        async fn remove_cart_item(&self, _token: &str, item_id: Uuid) -> Result<Cart, ClientError> {
            self.record("remove_cart_item");
            self.check_cart()?;
            self.cart.lock().unwrap().retain(|i| i.id != item_id);
            Ok(self.cart_view())
        }

        async fn clear_cart(&self, _token: &str) -> Result<Cart, ClientError> {
            self.record("clear_cart");
            self.check_cart()?;
            self.cart.lock().unwrap().clear();
            Ok(self.cart_view())
        }

        async fn merge_cart(
            &self,
            _token: &str,
            request: &MergeCartRequest,
        ) -> Result<MergeCartResponse, ClientError> {
            self.record("merge_cart");
            self.check_cart()?;
            let mut skipped = Vec::new();
            let unavailable = self.unavailable.lock().unwrap().clone();
            for item in &request.items {
                match Uuid::parse_str(&item.product_id) {
                    Ok(id) if !unavailable.contains(&id) => {
                        self.upsert(&item.product_id, item.quantity)
                    }
                    _ => skipped.push(item.product_id.clone()),
                }
            }
            Ok(MergeCartResponse {
                cart: self.cart_view(),
                skipped,
            })
        }

        async fn create_order(
            &self,
            _token: &str,
            request: &CreateOrderRequest,
        ) -> Result<Order, ClientError> {
            self.record("create_order");
            let totals = OrderTotals::from_lines(
                request.order_items.iter().map(|i| (1_000, i.quantity)),
            );
            let now = Utc::now();
            Ok(Order {
                id: Uuid::new_v4(),
                user_id: self.user.id,
                items: Vec::new(),
                shipping_address: request.shipping_address.clone(),
                payment_method: request.payment_method,
                payment_result: None,
                items_price: totals.items_price,
                tax_price: totals.tax_price,
                shipping_price: totals.shipping_price,
                total_price: totals.total_price,
                status: OrderStatus::Pending,
                is_paid: false,
                paid_at: None,
                is_delivered: false,
                delivered_at: None,
                tracking_number: "ORD-1-ABCDEF".into(),
                notes: request.notes.clone(),
                created_at: now,
                updated_at: now,
            })
        }
    }
}
