//! Budgets: per-category spending ceilings with derived spending figures and
//! threshold alerts.

mod alerts;
mod core;
mod endpoints;

pub use alerts::{
    ALERT_THRESHOLD, BudgetAlert, EMAIL_THRESHOLD, compute_alerts, dispatch_alert_emails,
};
pub use core::{
    BudgetId, BudgetLimit, BudgetStatus, Period, budget_statuses, create_budget_table,
    deactivate_budget, list_active_budgets, spending_by_category, upsert_budget,
};
pub use endpoints::{delete_budget, get_budget_alerts, get_budgets, set_budget};
