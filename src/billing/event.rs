//! The billing provider's webhook events, modeled as a tagged union.
//!
//! Webhook payloads are validated here, at the boundary; the reconciliation
//! code only ever sees well-formed events.

use serde_json::Value;
use time::OffsetDateTime;

use crate::{Error, subscription::Plan, user::UserId};

/// A validated billing event.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    /// The user completed payment for a new subscription.
    CheckoutCompleted {
        /// The user, recovered from the checkout session's metadata.
        user_id: UserId,
        /// The plan the session was created for.
        plan: Plan,
        /// The provider's customer identifier.
        customer_id: Option<String>,
        /// The provider's subscription identifier.
        subscription_id: String,
        /// When the first paid period ends, when the provider includes it.
        period_end: Option<OffsetDateTime>,
    },
    /// A renewal invoice was paid.
    InvoicePaid {
        /// The provider's subscription identifier.
        subscription_id: String,
        /// The end of the paid period.
        period_end: OffsetDateTime,
    },
    /// A renewal invoice failed to collect.
    PaymentFailed {
        /// The provider's subscription identifier.
        subscription_id: String,
    },
    /// The provider changed the subscription out of band.
    SubscriptionUpdated {
        /// The provider's subscription identifier.
        subscription_id: String,
        /// The provider's status string, mapped during reconciliation.
        status: String,
        /// The current period end, when included.
        period_end: Option<OffsetDateTime>,
    },
    /// The subscription ended at the provider.
    SubscriptionDeleted {
        /// The provider's subscription identifier.
        subscription_id: String,
    },
    /// An event type this service does not handle. Logged and ignored.
    Unknown {
        /// The provider's event type string.
        event_type: String,
    },
}

/// Parse and validate a webhook payload.
///
/// Unknown event types parse successfully into [BillingEvent::Unknown];
/// known types with missing required fields are errors.
///
/// # Errors
/// Returns an [Error::MalformedEvent] describing the first missing or
/// ill-typed field.
pub fn parse_event(payload: &[u8]) -> Result<BillingEvent, Error> {
    let body: Value = serde_json::from_slice(payload)
        .map_err(|error| Error::MalformedEvent(format!("payload is not JSON: {error}")))?;

    let event_type = body["type"]
        .as_str()
        .ok_or_else(|| Error::MalformedEvent("missing event type".to_owned()))?;
    let object = &body["data"]["object"];

    match event_type {
        "checkout.session.completed" => {
            let metadata = &object["metadata"];
            let user_id = metadata["user_id"]
                .as_str()
                .and_then(|value| value.parse::<UserId>().ok())
                .ok_or_else(|| {
                    Error::MalformedEvent("checkout metadata is missing user_id".to_owned())
                })?;
            let plan = metadata["plan"]
                .as_str()
                .ok_or_else(|| {
                    Error::MalformedEvent("checkout metadata is missing plan".to_owned())
                })
                .and_then(Plan::parse)?;
            let subscription_id = require_str(object, "subscription")?;

            Ok(BillingEvent::CheckoutCompleted {
                user_id,
                plan,
                customer_id: object["customer"].as_str().map(str::to_owned),
                subscription_id,
                period_end: optional_timestamp(object, "current_period_end")?,
            })
        }
        "invoice.payment_succeeded" => Ok(BillingEvent::InvoicePaid {
            subscription_id: require_str(object, "subscription")?,
            period_end: optional_timestamp(object, "period_end")?.ok_or_else(|| {
                Error::MalformedEvent("invoice is missing period_end".to_owned())
            })?,
        }),
        "invoice.payment_failed" => Ok(BillingEvent::PaymentFailed {
            subscription_id: require_str(object, "subscription")?,
        }),
        "customer.subscription.updated" => Ok(BillingEvent::SubscriptionUpdated {
            subscription_id: require_str(object, "id")?,
            status: require_str(object, "status")?,
            period_end: optional_timestamp(object, "current_period_end")?,
        }),
        "customer.subscription.deleted" => Ok(BillingEvent::SubscriptionDeleted {
            subscription_id: require_str(object, "id")?,
        }),
        other => Ok(BillingEvent::Unknown {
            event_type: other.to_owned(),
        }),
    }
}

fn require_str(object: &Value, field: &str) -> Result<String, Error> {
    object[field]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::MalformedEvent(format!("missing field \"{field}\"")))
}

/// Read a unix-seconds field that may be absent or null.
fn optional_timestamp(object: &Value, field: &str) -> Result<Option<OffsetDateTime>, Error> {
    match &object[field] {
        Value::Null => Ok(None),
        Value::Number(number) => {
            let seconds = number.as_i64().ok_or_else(|| {
                Error::MalformedEvent(format!("field \"{field}\" is not a unix timestamp"))
            })?;

            OffsetDateTime::from_unix_timestamp(seconds)
                .map(Some)
                .map_err(|_| {
                    Error::MalformedEvent(format!("field \"{field}\" is out of range"))
                })
        }
        _ => Err(Error::MalformedEvent(format!(
            "field \"{field}\" is not a unix timestamp"
        ))),
    }
}
