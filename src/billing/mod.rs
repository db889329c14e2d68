//! Billing: the provider seam for starting checkout sessions and the
//! webhook-driven reconciliation of subscription state.

mod endpoints;
mod event;
mod reconcile;
mod signature;

pub use endpoints::billing_webhook;
pub use event::{BillingEvent, parse_event};
pub use reconcile::apply_event;
pub use signature::{SIGNATURE_HEADER, sign_payload, verify_signature};

use async_trait::async_trait;

use crate::{subscription::Plan, user::UserId};

/// Errors reported by a [BillingClient].
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The provider rejected or failed the request.
    #[error("billing provider request failed: {0}")]
    Request(String),
}

impl From<BillingError> for crate::Error {
    fn from(value: BillingError) -> Self {
        match value {
            BillingError::Request(message) => crate::Error::Provider(message),
        }
    }
}

/// A checkout session created at the billing provider.
///
/// The session URL is where the user completes payment; the subscription
/// state only changes when the provider's webhook reports the completed
/// checkout.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CheckoutSession {
    /// The provider's identifier for the session.
    pub id: String,
    /// The URL the user is sent to for payment.
    pub url: String,
}

/// The billing provider contract.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Create a checkout session for upgrading `user_id` to `plan`.
    ///
    /// The session's metadata must carry the user ID and plan so the
    /// checkout-completed webhook can be reconciled.
    async fn create_checkout_session(
        &self,
        user_id: UserId,
        plan: Plan,
    ) -> Result<CheckoutSession, BillingError>;
}

/// A billing client that fabricates checkout sessions locally.
///
/// Used by the server binary when no billing provider is configured; paired
/// with manually-posted webhook events it exercises the full reconciliation
/// path.
pub struct SandboxBillingClient;

#[async_trait]
impl BillingClient for SandboxBillingClient {
    async fn create_checkout_session(
        &self,
        user_id: UserId,
        plan: Plan,
    ) -> Result<CheckoutSession, BillingError> {
        let id = format!("cs_sandbox_{user_id}_{}", plan.as_str());

        Ok(CheckoutSession {
            url: format!("https://billing.example.com/checkout/{id}"),
            id,
        })
    }
}
