//! Payment processor abstraction.
//!
//! The API never talks to a card network directly; it asks a [`PaymentGateway`]
//! for a payment intent, later asks for the intent's status, and issues refunds
//! against it. [`LocalGateway`] is an in-process processor used for
//! development and tests: intents settle as soon as they are confirmed.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use rand::{Rng, distr::Alphanumeric};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment intent {0} not found")]
    UnknownIntent(String),

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("refund of {requested} exceeds captured amount {captured}")]
    RefundTooLarge { requested: i64, captured: i64 },

    #[error("payment intent {0} has not succeeded")]
    NotCaptured(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresConfirmation,
    Processing,
    Succeeded,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub id: String,
    pub intent_id: String,
    pub amount: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        order_id: Uuid,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Confirm the intent and report the processor's view of it.
    async fn confirm_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn refund(&self, intent_id: &str, amount: i64) -> Result<Refund, GatewayError>;
}

#[derive(Debug, Default)]
pub struct LocalGateway {
    intents: Mutex<HashMap<String, LocalIntent>>,
}

#[derive(Debug, Clone)]
struct LocalIntent {
    intent: PaymentIntent,
    refunded: i64,
}

impl LocalGateway {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LocalIntent>>, GatewayError> {
        self.intents
            .lock()
            .map_err(|_| GatewayError::Unavailable("intent store poisoned".into()))
    }
}

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[async_trait]
impl PaymentGateway for LocalGateway {
    async fn create_intent(
        &self,
        order_id: Uuid,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::InvalidAmount);
        }
        let id = format!("pi_{}", Uuid::new_v4().simple());
        let intent = PaymentIntent {
            client_secret: format!("{id}_secret_{}", random_token(24)),
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            status: IntentStatus::RequiresConfirmation,
            order_id,
        };
        self.lock()?.insert(
            id,
            LocalIntent {
                intent: intent.clone(),
                refunded: 0,
            },
        );
        Ok(intent)
    }

    async fn confirm_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let mut intents = self.lock()?;
        let entry = intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))?;
        if entry.intent.status == IntentStatus::RequiresConfirmation {
            entry.intent.status = IntentStatus::Succeeded;
        }
        Ok(entry.intent.clone())
    }

    async fn refund(&self, intent_id: &str, amount: i64) -> Result<Refund, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::InvalidAmount);
        }
        let mut intents = self.lock()?;
        let entry = intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))?;
        if entry.intent.status != IntentStatus::Succeeded {
            return Err(GatewayError::NotCaptured(intent_id.to_string()));
        }
        let remaining = entry.intent.amount - entry.refunded;
        if amount > remaining {
            return Err(GatewayError::RefundTooLarge {
                requested: amount,
                captured: remaining,
            });
        }
        entry.refunded += amount;
        Ok(Refund {
            id: format!("re_{}", Uuid::new_v4().simple()),
            intent_id: intent_id.to_string(),
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn intents_settle_on_confirmation() {
        let gateway = LocalGateway::default();
        let order_id = Uuid::new_v4();
        let intent = gateway.create_intent(order_id, 17_280, "usd").await.unwrap();
        assert!(intent.id.starts_with("pi_"));
        assert!(intent.client_secret.starts_with(&intent.id));
        assert_eq!(intent.status, IntentStatus::RequiresConfirmation);

        let confirmed = gateway.confirm_intent(&intent.id).await.unwrap();
        assert_eq!(confirmed.status, IntentStatus::Succeeded);
        assert_eq!(confirmed.order_id, order_id);
    }

    #[tokio::test]
    async fn refunds_cannot_exceed_the_captured_amount() {
        let gateway = LocalGateway::default();
        let intent = gateway
            .create_intent(Uuid::new_v4(), 1_000, "usd")
            .await
            .unwrap();

        let err = gateway.refund(&intent.id, 500).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotCaptured(_)));

        gateway.confirm_intent(&intent.id).await.unwrap();
        gateway.refund(&intent.id, 600).await.unwrap();
        let err = gateway.refund(&intent.id, 600).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RefundTooLarge {
                requested: 600,
                captured: 400
            }
        ));
    }

    #[tokio::test]
    async fn unknown_intents_and_bad_amounts_are_rejected() {
        let gateway = LocalGateway::default();
        assert!(matches!(
            gateway.confirm_intent("pi_missing").await,
            Err(GatewayError::UnknownIntent(_))
        ));
        assert!(matches!(
            gateway.create_intent(Uuid::new_v4(), 0, "usd").await,
            Err(GatewayError::InvalidAmount)
        ));
    }
}
