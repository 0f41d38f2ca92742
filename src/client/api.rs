use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::ClientError;
use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, RegisterRequest},
        cart::{AddToCartRequest, MergeCartRequest, MergeCartResponse, UpdateCartItemRequest},
        orders::CreateOrderRequest,
    },
    models::{Cart, Order, User},
    response::FieldError,
};

/// The subset of the REST API the client-side stores rely on.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError>;

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError>;

    async fn profile(&self, token: &str) -> Result<User, ClientError>;

    async fn get_cart(&self, token: &str) -> Result<Cart, ClientError>;

    async fn add_to_cart(
        &self,
        token: &str,
        request: &AddToCartRequest,
    ) -> Result<Cart, ClientError>;

    async fn update_cart_item(
        &self,
        token: &str,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ClientError>;

    async fn remove_cart_item(&self, token: &str, item_id: Uuid) -> Result<Cart, ClientError>;

    async fn clear_cart(&self, token: &str) -> Result<Cart, ClientError>;

    async fn merge_cart(
        &self,
        token: &str,
        request: &MergeCartRequest,
    ) -> Result<MergeCartResponse, ClientError>;

    async fn create_order(
        &self,
        token: &str,
        request: &CreateOrderRequest,
    ) -> Result<Order, ClientError>;
}

/// Response envelope as seen from the client side.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    pub errors: Option<Vec<FieldError>>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ClientError> {
        self.data
            .ok_or_else(|| ClientError::Decode(format!("response has no data: {}", self.message)))
    }
}

/// Turn a non-success status and its body into a [`ClientError`].
pub fn error_from_body(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .map(|envelope| match envelope.errors {
            Some(errors) if !errors.is_empty() => errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join(", "),
            _ => envelope.message,
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ClientError::Unauthorized(message);
    }
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

/// [`StorefrontApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/api{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| ClientError::Decode(format!("Failed to parse response: {e}")))?;
        if !envelope.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.message,
            });
        }
        envelope.into_data()
    }

    async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        self.send(self.request(method, path, token).json(body)).await
    }
}

#[async_trait]
impl StorefrontApi for HttpApi {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        self.send_json(Method::POST, "/auth/register", None, request)
            .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send_json(Method::POST, "/auth/login", None, &body).await
    }

    async fn profile(&self, token: &str) -> Result<User, ClientError> {
        self.send(self.request(Method::GET, "/auth/profile", Some(token)))
            .await
    }

    async fn get_cart(&self, token: &str) -> Result<Cart, ClientError> {
        self.send(self.request(Method::GET, "/cart", Some(token)))
            .await
    }

    async fn add_to_cart(
        &self,
        token: &str,
        request: &AddToCartRequest,
    ) -> Result<Cart, ClientError> {
        self.send_json(Method::POST, "/cart", Some(token), request)
            .await
    }

    async fn update_cart_item(
        &self,
        token: &str,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ClientError> {
        let body = UpdateCartItemRequest { quantity };
        self.send_json(Method::PUT, &format!("/cart/{item_id}"), Some(token), &body)
            .await
    }

    async fn remove_cart_item(&self, token: &str, item_id: Uuid) -> Result<Cart, ClientError> {
        self.send(self.request(Method::DELETE, &format!("/cart/{item_id}"), Some(token)))
            .await
    }

    async fn clear_cart(&self, token: &str) -> Result<Cart, ClientError> {
        self.send(self.request(Method::DELETE, "/cart", Some(token)))
            .await
    }

    async fn merge_cart(
        &self,
        token: &str,
        request: &MergeCartRequest,
    ) -> Result<MergeCartResponse, ClientError> {
        self.send_json(Method::POST, "/cart/merge", Some(token), request)
            .await
    }

    async fn create_order(
        &self,
        token: &str,
        request: &CreateOrderRequest,
    ) -> Result<Order, ClientError> {
        self.send_json(Method::POST, "/orders", Some(token), request)
            .await
    }
}
