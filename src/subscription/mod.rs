//! Subscriptions: one row per user tracking the billing tier that gates how
//! many banks they may connect.

mod core;
mod endpoints;
mod limits;

pub use core::{
    Plan, Subscription, SubscriptionStatus, cancel_to_free, create_subscription_table,
    ensure_subscription, find_by_provider_subscription, get_subscription, read_subscription,
    refresh_period, set_status, upsert_from_checkout,
};
pub use endpoints::{
    can_connect_endpoint, cancel_subscription, get_my_subscription, update_subscription,
};
pub use limits::{ConnectGate, can_connect, connection_limit, enforce_connection_limit};
