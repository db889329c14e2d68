//! The API endpoint URIs.

/// The route for starting the bank consent flow.
pub const CONNECT_BANK: &str = "/api/banks/connect";
/// The route for finalizing and listing bank connections.
pub const BANKS: &str = "/api/banks";
/// The route for one bank connection.
pub const BANK: &str = "/api/banks/{connection_id}";
/// The route for syncing a connection's transactions.
pub const SYNC_BANK: &str = "/api/banks/{connection_id}/sync";
/// The route for the financial summary.
pub const SUMMARY: &str = "/api/summary";
/// The route for creating and listing budgets.
pub const BUDGETS: &str = "/api/budgets";
/// The route for one budget.
pub const BUDGET: &str = "/api/budgets/{budget_id}";
/// The route for budget alerts.
pub const BUDGET_ALERTS: &str = "/api/budgets/alerts";
/// The route for reading and updating the subscription.
pub const SUBSCRIPTION: &str = "/api/subscription";
/// The route for a user-initiated cancel.
pub const CANCEL_SUBSCRIPTION: &str = "/api/subscription/cancel";
/// The route for the plan-limit check.
pub const CAN_CONNECT: &str = "/api/subscription/can-connect";
/// The route the billing provider delivers webhook events to.
pub const BILLING_WEBHOOK: &str = "/api/webhooks/billing";
