//! Applies validated billing events to local subscription state.
//!
//! The provider does not guarantee delivery order, and it redelivers events
//! until they are acknowledged. Every handler here is therefore idempotent,
//! and period ends are taken from the event's own fields rather than arrival
//! order.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error,
    subscription::{SubscriptionStatus, refresh_period, set_status, upsert_from_checkout},
};

use super::BillingEvent;

/// Apply one event to the database.
///
/// Events referencing subscriptions this service never saw are logged and
/// ignored, as are [BillingEvent::Unknown] events; the provider should stop
/// redelivering them.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn apply_event(
    event: BillingEvent,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    match event {
        BillingEvent::CheckoutCompleted {
            user_id,
            plan,
            customer_id,
            subscription_id,
            period_end,
        } => {
            let subscription = upsert_from_checkout(
                user_id,
                plan,
                customer_id.as_deref(),
                &subscription_id,
                period_end,
                now,
                connection,
            )?;
            tracing::info!(
                user_id,
                plan = subscription.plan.as_str(),
                "subscription activated by checkout"
            );
        }
        BillingEvent::InvoicePaid {
            subscription_id,
            period_end,
        } => {
            let updated = refresh_period(
                &subscription_id,
                SubscriptionStatus::Active,
                Some(period_end),
                now,
                connection,
            )?;

            match updated {
                Some(subscription) => tracing::info!(
                    user_id = subscription.user_id,
                    "subscription renewed until {period_end}"
                ),
                None => tracing::warn!(subscription_id, "invoice paid for unknown subscription"),
            }
        }
        BillingEvent::PaymentFailed { subscription_id } => {
            let updated = set_status(
                &subscription_id,
                SubscriptionStatus::PastDue,
                None,
                now,
                connection,
            )?;

            match updated {
                Some(subscription) => tracing::warn!(
                    user_id = subscription.user_id,
                    "payment failed, subscription is past due"
                ),
                None => {
                    tracing::warn!(subscription_id, "payment failed for unknown subscription")
                }
            }
        }
        BillingEvent::SubscriptionUpdated {
            subscription_id,
            status,
            period_end,
        } => match map_provider_status(&status) {
            Some(status) => {
                refresh_period(&subscription_id, status, period_end, now, connection)?;
            }
            None => {
                tracing::warn!(
                    subscription_id,
                    status,
                    "ignoring subscription update with unrecognized status"
                );
            }
        },
        BillingEvent::SubscriptionDeleted { subscription_id } => {
            let updated = set_status(
                &subscription_id,
                SubscriptionStatus::Canceled,
                Some(now),
                now,
                connection,
            )?;

            if updated.is_none() {
                tracing::warn!(subscription_id, "deletion of unknown subscription");
            }
        }
        BillingEvent::Unknown { event_type } => {
            tracing::info!(event_type, "ignoring unhandled billing event type");
        }
    }

    Ok(())
}

/// Map the provider's status vocabulary onto the local one.
fn map_provider_status(status: &str) -> Option<SubscriptionStatus> {
    match status {
        "active" | "trialing" => Some(SubscriptionStatus::Active),
        "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
        "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
        _ => None,
    }
}

#[cfg(test)]
mod apply_event_tests {
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::{
        db::initialize,
        subscription::{Plan, SubscriptionStatus, get_subscription},
    };

    use super::{BillingEvent, apply_event};

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn checkout_event(period_end: Option<OffsetDateTime>) -> BillingEvent {
        BillingEvent::CheckoutCompleted {
            user_id: 1,
            plan: Plan::ProMonthly,
            customer_id: Some("cus_1".to_owned()),
            subscription_id: "sub_1".to_owned(),
            period_end,
        }
    }

    #[test]
    fn replayed_checkout_leaves_one_active_subscription() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let period_end = now + Duration::days(30);

        apply_event(checkout_event(Some(period_end)), now, &conn).unwrap();
        apply_event(checkout_event(Some(period_end)), now + Duration::minutes(1), &conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM subscription", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let subscription = get_subscription(1, &conn).unwrap();
        assert_eq!(subscription.plan, Plan::ProMonthly);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
    }

    #[test]
    fn out_of_order_invoices_keep_the_latest_period() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let first_period = now + Duration::days(30);
        let second_period = now + Duration::days(60);
        apply_event(checkout_event(Some(first_period)), now, &conn).unwrap();

        // The second invoice arrives before the first.
        apply_event(
            BillingEvent::InvoicePaid {
                subscription_id: "sub_1".to_owned(),
                period_end: second_period,
            },
            now,
            &conn,
        )
        .unwrap();
        apply_event(
            BillingEvent::InvoicePaid {
                subscription_id: "sub_1".to_owned(),
                period_end: first_period,
            },
            now,
            &conn,
        )
        .unwrap();

        let subscription = get_subscription(1, &conn).unwrap();
        assert_eq!(subscription.current_period_end, Some(second_period));
    }

    #[test]
    fn payment_failure_then_recovery() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        apply_event(checkout_event(None), now, &conn).unwrap();

        apply_event(
            BillingEvent::PaymentFailed {
                subscription_id: "sub_1".to_owned(),
            },
            now,
            &conn,
        )
        .unwrap();
        assert_eq!(
            get_subscription(1, &conn).unwrap().status,
            SubscriptionStatus::PastDue
        );

        apply_event(
            BillingEvent::InvoicePaid {
                subscription_id: "sub_1".to_owned(),
                period_end: now + Duration::days(30),
            },
            now,
            &conn,
        )
        .unwrap();
        assert_eq!(
            get_subscription(1, &conn).unwrap().status,
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn deletion_cancels_the_subscription() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        apply_event(checkout_event(None), now, &conn).unwrap();

        apply_event(
            BillingEvent::SubscriptionDeleted {
                subscription_id: "sub_1".to_owned(),
            },
            now,
            &conn,
        )
        .unwrap();

        let subscription = get_subscription(1, &conn).unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Canceled);
        assert_eq!(subscription.effective_plan(), Plan::Free);
    }

    #[test]
    fn events_for_unknown_subscriptions_are_ignored() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();

        let result = apply_event(
            BillingEvent::InvoicePaid {
                subscription_id: "sub_404".to_owned(),
                period_end: now,
            },
            now,
            &conn,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let conn = get_test_connection();

        let result = apply_event(
            BillingEvent::Unknown {
                event_type: "customer.created".to_owned(),
            },
            OffsetDateTime::now_utc(),
            &conn,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn provider_status_updates_are_mapped() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        apply_event(checkout_event(None), now, &conn).unwrap();

        apply_event(
            BillingEvent::SubscriptionUpdated {
                subscription_id: "sub_1".to_owned(),
                status: "unpaid".to_owned(),
                period_end: None,
            },
            now,
            &conn,
        )
        .unwrap();

        assert_eq!(
            get_subscription(1, &conn).unwrap().status,
            SubscriptionStatus::PastDue
        );
    }
}
