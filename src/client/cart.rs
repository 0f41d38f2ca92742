use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ClientError,
    api::StorefrontApi,
    storage::{CART_KEY, Storage, read_json, write_json},
};
use crate::{
    dto::cart::{AddToCartRequest, MergeCartRequest},
    models::Cart,
};

/// A cart line as the client keeps it.
///
/// `product_id` stays a string so guest carts can hold references the
/// server has never seen. `item_id` is the server line id once known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCartItem {
    pub product_id: String,
    #[serde(default)]
    pub item_id: Option<Uuid>,
    pub name: String,
    pub price: i64,
    pub image: Option<String>,
    pub quantity: i32,
}

impl LocalCartItem {
    /// Whether the server can hold this line.
    pub fn is_persistable(&self) -> bool {
        Uuid::parse_str(&self.product_id).is_ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartState {
    pub items: Vec<LocalCartItem>,
    pub loading: bool,
    pub error: Option<String>,
}

impl CartState {
    pub fn total_price(&self) -> i64 {
        self.items
            .iter()
            .map(|i| i.price * i64::from(i.quantity))
            .sum()
    }

    pub fn item_count(&self) -> i32 {
        self.items
            .iter()
            .fold(0, |count: i32, i| count.saturating_add(i.quantity))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    SetItems(Vec<LocalCartItem>),
    /// Adds a line, summing quantities when the product is already present.
    AddItem(LocalCartItem),
    /// A quantity of zero or less removes the line.
    UpdateQuantity { product_id: String, quantity: i32 },
    RemoveItem(String),
    Clear,
    SetLoading(bool),
    SetError(Option<String>),
}

pub fn reduce(state: &CartState, action: CartAction) -> CartState {
    let mut next = state.clone();
    match action {
        CartAction::SetItems(items) => {
            next.items = items;
            next.loading = false;
        }
        CartAction::AddItem(item) => {
            match next.items.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity)
                }
                None => next.items.push(item),
            }
        }
        CartAction::UpdateQuantity {
            product_id,
            quantity,
        } => {
            if quantity <= 0 {
                next.items.retain(|i| i.product_id != product_id);
            } else if let Some(item) = next.items.iter_mut().find(|i| i.product_id == product_id)
            {
                item.quantity = quantity;
            }
        }
        CartAction::RemoveItem(product_id) => next.items.retain(|i| i.product_id != product_id),
        CartAction::Clear => next.items.clear(),
        CartAction::SetLoading(loading) => next.loading = loading,
        CartAction::SetError(error) => {
            next.error = error;
            next.loading = false;
        }
    }
    next
}

pub fn from_server(cart: &Cart) -> Vec<LocalCartItem> {
    cart.items
        .iter()
        .map(|item| LocalCartItem {
            product_id: item.product_id.to_string(),
            item_id: Some(item.id),
            name: item.name.clone(),
            price: item.price,
            image: item.image.clone(),
            quantity: item.quantity,
        })
        .collect()
}

/// The server cart wins for every line it can hold; local-only lines are kept.
pub fn reconcile(local: &[LocalCartItem], server: &Cart) -> Vec<LocalCartItem> {
    let mut items = from_server(server);
    items.extend(local.iter().filter(|i| !i.is_persistable()).cloned());
    items
}

/// Optimistic cart persisted to [`Storage`], mirrored to the server when a
/// token is available. Server failures are logged and never undo local state.
pub struct CartStore {
    api: Arc<dyn StorefrontApi>,
    storage: Arc<dyn Storage>,
    state: CartState,
}

impl CartStore {
    pub fn new(api: Arc<dyn StorefrontApi>, storage: Arc<dyn Storage>) -> Self {
        let items = match read_json::<Vec<LocalCartItem>>(storage.as_ref(), CART_KEY) {
            Ok(items) => items.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable stored cart");
                Vec::new()
            }
        };
        Self {
            api,
            storage,
            state: CartState {
                items,
                ..CartState::default()
            },
        }
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    fn dispatch(&mut self, action: CartAction) -> Result<(), ClientError> {
        self.state = reduce(&self.state, action);
        write_json(self.storage.as_ref(), CART_KEY, &self.state.items)
    }

    fn adopt(&mut self, server: &Cart) -> Result<(), ClientError> {
        let items = reconcile(&self.state.items, server);
        self.dispatch(CartAction::SetItems(items))
    }

    fn item_id_of(&self, product_id: &str) -> Option<Uuid> {
        self.state
            .items
            .iter()
            .find(|i| i.product_id == product_id)
            .and_then(|i| i.item_id)
    }

    fn server_failed(&mut self, operation: &str, err: ClientError) {
        tracing::warn!(operation, error = %err, "cart sync failed; keeping local cart");
        self.state.loading = false;
    }

    pub async fn add_item(
        &mut self,
        token: Option<&str>,
        item: LocalCartItem,
    ) -> Result<(), ClientError> {
        let request = AddToCartRequest {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
        };
        let persistable = item.is_persistable();
        self.dispatch(CartAction::AddItem(item))?;

        let Some(token) = token.filter(|_| persistable) else {
            return Ok(());
        };
        match self.api.add_to_cart(token, &request).await {
            Ok(cart) => self.adopt(&cart),
            Err(err) => {
                self.server_failed("add", err);
                Ok(())
            }
        }
    }

    pub async fn update_quantity(
        &mut self,
        token: Option<&str>,
        product_id: &str,
        quantity: i32,
    ) -> Result<(), ClientError> {
        let item_id = self.item_id_of(product_id);
        self.dispatch(CartAction::UpdateQuantity {
            product_id: product_id.to_string(),
            quantity,
        })?;

        let (Some(token), Some(item_id)) = (token, item_id) else {
            return Ok(());
        };
        let result = if quantity <= 0 {
            self.api.remove_cart_item(token, item_id).await
        } else {
            self.api.update_cart_item(token, item_id, quantity).await
        };
        match result {
            Ok(cart) => self.adopt(&cart),
            Err(err) => {
                self.server_failed("update", err);
                Ok(())
            }
        }
    }

    pub async fn remove_item(
        &mut self,
        token: Option<&str>,
        product_id: &str,
    ) -> Result<(), ClientError> {
        self.update_quantity(token, product_id, 0).await
    }

    pub async fn clear(&mut self, token: Option<&str>) -> Result<(), ClientError> {
        self.dispatch(CartAction::Clear)?;
        let Some(token) = token else {
            return Ok(());
        };
        if let Err(err) = self.api.clear_cart(token).await {
            self.server_failed("clear", err);
        }
        Ok(())
    }

    /// Replace persistable lines with the server's view of the cart.
    pub async fn sync(&mut self, token: &str) -> Result<(), ClientError> {
        self.state.loading = true;
        match self.api.get_cart(token).await {
            Ok(cart) => self.adopt(&cart),
            Err(err) => {
                self.server_failed("sync", err);
                Ok(())
            }
        }
    }

    /// Push the guest cart into the user's server cart after login.
    ///
    /// Returns the product references the server did not take. Local-only
    /// (non-UUID) lines stay in the cart; product lines the server skipped
    /// (unknown, inactive or out of stock) are dropped and only reported.
    pub async fn merge_on_login(&mut self, token: &str) -> Result<Vec<String>, ClientError> {
        let items: Vec<AddToCartRequest> = self
            .state
            .items
            .iter()
            .filter(|i| i.is_persistable())
            .map(|i| AddToCartRequest {
                product_id: i.product_id.clone(),
                quantity: i.quantity,
            })
            .collect();

        if items.is_empty() {
            self.sync(token).await?;
            return Ok(Vec::new());
        }

        self.state.loading = true;
        match self.api.merge_cart(token, &MergeCartRequest { items }).await {
            Ok(merged) => {
                self.adopt(&merged.cart)?;
                if !merged.skipped.is_empty() {
                    tracing::info!(skipped = ?merged.skipped, "some cart lines were not merged");
                }
                Ok(merged.skipped)
            }
            Err(err) => {
                self.server_failed("merge", err);
                Ok(Vec::new())
            }
        }
    }
}
