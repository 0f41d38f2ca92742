use uuid::Uuid;
use validator::Validate;

use super::{ClientError, api::StorefrontApi, cart::LocalCartItem};
use crate::{
    dto::orders::{CreateOrderRequest, OrderItemRequest},
    models::{Order, PaymentMethod, ShippingAddress},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Payment,
    Review,
    /// An order request is in flight; further submissions are refused.
    Submitting,
    Completed,
}

/// Multi-step checkout form state.
#[derive(Debug, Clone, Default)]
pub struct CheckoutFlow {
    step: CheckoutStep,
    shipping: Option<ShippingAddress>,
    payment_method: Option<PaymentMethod>,
    notes: Option<String>,
    order: Option<Order>,
    error: Option<String>,
}

fn out_of_step(expected: &str, step: CheckoutStep) -> ClientError {
    ClientError::Invalid(format!("Checkout is at {step:?}, expected {expected}"))
}

impl CheckoutFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn shipping(&self) -> Option<&ShippingAddress> {
        self.shipping.as_ref()
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.step == CheckoutStep::Submitting
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes.filter(|n| !n.trim().is_empty());
    }

    pub fn set_shipping(&mut self, address: ShippingAddress) -> Result<(), ClientError> {
        if !matches!(self.step, CheckoutStep::Shipping | CheckoutStep::Review) {
            return Err(out_of_step("Shipping", self.step));
        }
        address
            .validate()
            .map_err(|e| ClientError::Invalid(e.to_string()))?;
        self.shipping = Some(address);
        self.error = None;
        self.step = if self.payment_method.is_some() && self.step == CheckoutStep::Review {
            CheckoutStep::Review
        } else {
            CheckoutStep::Payment
        };
        Ok(())
    }

    pub fn set_payment_method(&mut self, method: PaymentMethod) -> Result<(), ClientError> {
        if !matches!(self.step, CheckoutStep::Payment | CheckoutStep::Review) {
            return Err(out_of_step("Payment", self.step));
        }
        self.payment_method = Some(method);
        self.error = None;
        self.step = CheckoutStep::Review;
        Ok(())
    }

    /// Step back one screen. No effect while submitting or once completed.
    pub fn back(&mut self) {
        self.step = match self.step {
            CheckoutStep::Payment => CheckoutStep::Shipping,
            CheckoutStep::Review => CheckoutStep::Payment,
            other => other,
        };
    }

    /// Build the order request for `items`.
    pub fn order_request(&self, items: &[LocalCartItem]) -> Result<CreateOrderRequest, ClientError> {
        if items.is_empty() {
            return Err(ClientError::Invalid("Your cart is empty".into()));
        }
        let shipping = self
            .shipping
            .clone()
            .ok_or_else(|| ClientError::Invalid("Shipping address is required".into()))?;
        let payment_method = self
            .payment_method
            .ok_or_else(|| ClientError::Invalid("Payment method is required".into()))?;

        let order_items = items
            .iter()
            .map(|item| {
                let product = Uuid::parse_str(&item.product_id).map_err(|_| {
                    ClientError::Invalid(format!("{} cannot be ordered", item.name))
                })?;
                Ok(OrderItemRequest {
                    product,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, ClientError>>()?;

        Ok(CreateOrderRequest {
            order_items,
            shipping_address: shipping,
            payment_method,
            notes: self.notes.clone(),
        })
    }

    /// Enter `Submitting`. Only allowed from `Review`.
    pub fn begin_submit(&mut self) -> Result<(), ClientError> {
        match self.step {
            CheckoutStep::Review => {
                self.step = CheckoutStep::Submitting;
                self.error = None;
                Ok(())
            }
            CheckoutStep::Submitting => Err(ClientError::Invalid(
                "Order is already being submitted".into(),
            )),
            step => Err(out_of_step("Review", step)),
        }
    }

    pub fn complete(&mut self, order: Order) {
        self.order = Some(order);
        self.step = CheckoutStep::Completed;
    }

    /// Return to `Review` with an error so the user can retry.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.step = CheckoutStep::Review;
    }

    pub async fn submit(
        &mut self,
        api: &dyn StorefrontApi,
        token: &str,
        items: &[LocalCartItem],
    ) -> Result<Order, ClientError> {
        if self.is_submitting() {
            return Err(ClientError::Invalid(
                "Order is already being submitted".into(),
            ));
        }
        let request = self.order_request(items)?;
        self.begin_submit()?;

        match api.create_order(token, &request).await {
            Ok(order) => {
                tracing::info!(order_id = %order.id, tracking = %order.tracking_number, "order placed");
                self.complete(order.clone());
                Ok(order)
            }
            Err(err) => {
                self.fail(err.user_message());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeApi;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: "62701".into(),
            country: "US".into(),
        }
    }

    fn items() -> Vec<LocalCartItem> {
        vec![LocalCartItem {
            product_id: Uuid::new_v4().to_string(),
            item_id: None,
            name: "Mug".into(),
            price: 1_000,
            image: None,
            quantity: 2,
        }]
    }

    fn at_review() -> CheckoutFlow {
        let mut flow = CheckoutFlow::new();
        flow.set_shipping(address()).unwrap();
        flow.set_payment_method(PaymentMethod::Paypal).unwrap();
        flow
    }

    #[test]
    fn steps_advance_in_order() {
        let mut flow = CheckoutFlow::new();
        assert_eq!(flow.step(), CheckoutStep::Shipping);
        assert!(flow.set_payment_method(PaymentMethod::Stripe).is_err());

        flow.set_shipping(address()).unwrap();
        assert_eq!(flow.step(), CheckoutStep::Payment);
        flow.set_payment_method(PaymentMethod::Stripe).unwrap();
        assert_eq!(flow.step(), CheckoutStep::Review);

        flow.back();
        assert_eq!(flow.step(), CheckoutStep::Payment);
        flow.back();
        assert_eq!(flow.step(), CheckoutStep::Shipping);
    }

    #[test]
    fn invalid_address_keeps_the_shipping_step() {
        let mut flow = CheckoutFlow::new();
        let err = flow
            .set_shipping(ShippingAddress {
                zip_code: String::new(),
                ..address()
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::Invalid(_)));
        assert_eq!(flow.step(), CheckoutStep::Shipping);
    }

    #[test]
    fn duplicate_submission_is_rejected() {
        let mut flow = at_review();
        flow.begin_submit().unwrap();
        assert!(flow.is_submitting());
        let err = flow.begin_submit().unwrap_err();
        assert_eq!(err.to_string(), "Order is already being submitted");

        flow.back();
        assert_eq!(flow.step(), CheckoutStep::Submitting);
    }

    #[test]
    fn local_only_lines_cannot_be_ordered() {
        let flow = at_review();
        let mut lines = items();
        lines[0].product_id = "sample1".into();
        let err = flow.order_request(&lines).unwrap_err();
        assert_eq!(err.to_string(), "Mug cannot be ordered");
        assert!(flow.order_request(&[]).is_err());
    }

    #[tokio::test]
    async fn submit_completes_with_the_created_order() {
        let api = FakeApi::new();
        let mut flow = at_review();
        flow.set_notes(Some("Leave at the door".into()));

        let order = flow.submit(&api, "token-1", &items()).await.unwrap();
        assert_eq!(flow.step(), CheckoutStep::Completed);
        assert_eq!(order.items_price, 2_000);
        assert_eq!(order.tax_price, 160);
        assert_eq!(order.shipping_price, 1_000);
        assert_eq!(order.total_price, 3_160);
        assert_eq!(order.notes.as_deref(), Some("Leave at the door"));
        assert_eq!(flow.order().map(|o| o.id), Some(order.id));
    }

    #[tokio::test]
    async fn submit_while_submitting_does_not_reach_the_server() {
        let api = FakeApi::new();
        let mut flow = at_review();
        flow.begin_submit().unwrap();

        assert!(flow.submit(&api, "token-1", &items()).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn failure_returns_to_review() {
        let mut flow = at_review();
        flow.begin_submit().unwrap();
        flow.fail("Insufficient stock for Mug. Available: 1, Requested: 2");
        assert_eq!(flow.step(), CheckoutStep::Review);
        assert!(flow.error().is_some());
        flow.begin_submit().unwrap();
    }
}
