//! Application router configuration.

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::{
    AppState,
    billing::billing_webhook,
    budget::{delete_budget, get_budget_alerts, get_budgets, set_budget},
    connection::{connect_bank, finalize_connection, list_banks, remove_bank},
    endpoints,
    subscription::{
        can_connect_endpoint, cancel_subscription, get_my_subscription, update_subscription,
    },
    summary::get_summary,
    transaction::sync_transactions,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::CONNECT_BANK, post(connect_bank))
        .route(endpoints::BANKS, post(finalize_connection).get(list_banks))
        .route(endpoints::BANK, delete(remove_bank))
        .route(endpoints::SYNC_BANK, post(sync_transactions))
        .route(endpoints::SUMMARY, get(get_summary))
        .route(endpoints::BUDGET_ALERTS, get(get_budget_alerts))
        .route(endpoints::BUDGETS, post(set_budget).get(get_budgets))
        .route(endpoints::BUDGET, delete(delete_budget))
        .route(
            endpoints::SUBSCRIPTION,
            get(get_my_subscription).put(update_subscription),
        )
        .route(endpoints::CANCEL_SUBSCRIPTION, post(cancel_subscription))
        .route(endpoints::CAN_CONNECT, get(can_connect_endpoint))
        .route(endpoints::BILLING_WEBHOOK, post(billing_webhook))
        .with_state(state)
}
