//! The financial summary shared by every consumer that reports on a user's
//! finances.
//!
//! Having one aggregation (and one normalizer behind it) is what keeps the
//! dashboard, the budgets, and any downstream consumer reporting the same
//! totals for the same period.

use std::collections::HashMap;

use axum::{Json, extract::Query, extract::State, response::IntoResponse};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    auth::AuthenticatedUser,
    budget::Period,
    category::normalize_category,
    connection::list_connections,
    state::DbState,
    transaction::{Direction, Transaction, list_transactions_in_range},
    user::UserId,
};

/// How many categories the top-categories list holds.
const TOP_CATEGORY_COUNT: usize = 5;

/// How many transactions the recent-transactions list holds.
const RECENT_TRANSACTION_COUNT: usize = 10;

/// A category and the amount spent in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    /// The normalized category.
    pub category: String,
    /// Total spending in the category over the period.
    pub amount: f64,
}

/// A user's aggregated finances over one period.
#[derive(Debug, Serialize)]
pub struct FinancialSummary {
    /// The period the summary covers.
    pub period: Period,
    /// The number of connected banks.
    pub connected_banks: usize,
    /// The sum of the connected banks' balances.
    pub total_balance: f64,
    /// Total income over the period.
    pub total_income: f64,
    /// Total expenses over the period, as a positive number.
    pub total_expenses: f64,
    /// `total_income - total_expenses`.
    pub net_amount: f64,
    /// The number of transactions in the period.
    pub transaction_count: usize,
    /// Expense totals per normalized category.
    pub category_breakdown: HashMap<String, f64>,
    /// Movement totals per bank.
    pub bank_breakdown: HashMap<String, f64>,
    /// The largest expense categories, descending.
    pub top_categories: Vec<CategoryTotal>,
    /// The most recent transactions, newest first.
    pub recent_transactions: Vec<Transaction>,
}

/// Aggregate `user_id`'s finances over the trailing window ending at `now`.
///
/// Only transactions whose connection is still connected are counted, the
/// same rule every other read path uses.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn financial_summary(
    user_id: UserId,
    period: Period,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<FinancialSummary, Error> {
    let connections = list_connections(user_id, connection)?;
    let bank_names: HashMap<i64, String> = connections
        .iter()
        .map(|bank| (bank.id, bank.bank_name.clone()))
        .collect();

    let connected: Vec<_> = connections
        .iter()
        .filter(|bank| bank.status == crate::connection::ConnectionStatus::Connected)
        .collect();
    let total_balance = connected.iter().map(|bank| bank.balance).sum();

    let end = now.date();
    let start = (now - period.window()).date();
    let transactions = list_transactions_in_range(user_id, start, end, connection)?;

    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut category_breakdown: HashMap<String, f64> = HashMap::new();
    let mut bank_breakdown: HashMap<String, f64> = HashMap::new();

    for transaction in &transactions {
        let amount = transaction.amount.abs();

        match transaction.direction {
            Direction::Income => total_income += amount,
            Direction::Expense => {
                total_expenses += amount;
                let category = normalize_category(&transaction.category);
                *category_breakdown.entry(category).or_insert(0.0) += amount;
            }
        }

        let bank = bank_names
            .get(&transaction.connection_id)
            .cloned()
            .unwrap_or_else(|| "Unknown Bank".to_owned());
        *bank_breakdown.entry(bank).or_insert(0.0) += amount;
    }

    let mut top_categories: Vec<CategoryTotal> = category_breakdown
        .iter()
        .map(|(category, amount)| CategoryTotal {
            category: category.clone(),
            amount: *amount,
        })
        .collect();
    top_categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    top_categories.truncate(TOP_CATEGORY_COUNT);

    // Transactions arrive newest first from the range query.
    let recent_transactions: Vec<Transaction> = transactions
        .iter()
        .take(RECENT_TRANSACTION_COUNT)
        .cloned()
        .collect();

    Ok(FinancialSummary {
        period,
        connected_banks: connected.len(),
        total_balance,
        total_income,
        total_expenses,
        net_amount: total_income - total_expenses,
        transaction_count: transactions.len(),
        category_breakdown,
        bank_breakdown,
        top_categories,
        recent_transactions,
    })
}

/// Query parameters for the summary endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    /// The period to aggregate over. Defaults to month.
    pub period: Option<String>,
}

/// Route handler for the financial summary.
pub async fn get_summary(
    State(state): State<DbState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, Error> {
    let period = query
        .period
        .as_deref()
        .map(Period::parse)
        .unwrap_or(Ok(Period::Month))?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let summary = financial_summary(user_id, period, OffsetDateTime::now_utc(), &connection)?;

    Ok(Json(summary))
}

#[cfg(test)]
mod financial_summary_tests {
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::{
        budget::Period,
        connection::create_bank_connection,
        db::initialize,
        transaction::{NewTransaction, create_transaction},
    };

    use super::financial_summary;

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn seed_transaction(
        conn: &Connection,
        connection_id: i64,
        amount: f64,
        category: &str,
        external_id: &str,
        date: time::Date,
    ) {
        create_transaction(
            NewTransaction {
                user_id: 1,
                connection_id,
                amount,
                name: "merchant".to_owned(),
                category: category.to_owned(),
                normalized_category: crate::category::normalize_category(category),
                date,
                external_id: Some(external_id.to_owned()),
            },
            conn,
        )
        .unwrap();
    }

    #[test]
    fn totals_split_by_direction() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let bank = create_bank_connection(1, "req-1", "Bank A", 500.0, "EUR", now, &conn).unwrap();
        seed_transaction(&conn, bank.id, 2750.0, "Salary", "ext-1", now.date());
        seed_transaction(&conn, bank.id, -100.0, "Food", "ext-2", now.date());
        seed_transaction(&conn, bank.id, -50.0, "travel", "ext-3", now.date());

        let summary = financial_summary(1, Period::Month, now, &conn).unwrap();

        assert_eq!(summary.total_income, 2750.0);
        assert_eq!(summary.total_expenses, 150.0);
        assert_eq!(summary.net_amount, 2600.0);
        assert_eq!(summary.transaction_count, 3);
        assert_eq!(summary.total_balance, 500.0);
        assert_eq!(summary.connected_banks, 1);
    }

    #[test]
    fn expense_breakdown_uses_the_shared_normalizer() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let bank = create_bank_connection(1, "req-1", "Bank A", 0.0, "EUR", now, &conn).unwrap();
        seed_transaction(&conn, bank.id, -30.0, "travel", "ext-1", now.date());
        seed_transaction(&conn, bank.id, -20.0, "Transportation", "ext-2", now.date());
        seed_transaction(&conn, bank.id, -10.0, "Category: Transport", "ext-3", now.date());

        let summary = financial_summary(1, Period::Month, now, &conn).unwrap();

        assert_eq!(summary.category_breakdown.len(), 1);
        assert_eq!(summary.category_breakdown["Transport"], 60.0);
        assert_eq!(summary.top_categories[0].category, "Transport");
    }

    #[test]
    fn income_is_excluded_from_the_category_breakdown() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let bank = create_bank_connection(1, "req-1", "Bank A", 0.0, "EUR", now, &conn).unwrap();
        seed_transaction(&conn, bank.id, 2750.0, "Salary", "ext-1", now.date());

        let summary = financial_summary(1, Period::Month, now, &conn).unwrap();

        assert!(summary.category_breakdown.is_empty());
    }

    #[test]
    fn old_transactions_fall_outside_the_window() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let bank = create_bank_connection(1, "req-1", "Bank A", 0.0, "EUR", now, &conn).unwrap();
        seed_transaction(
            &conn,
            bank.id,
            -10.0,
            "Food",
            "ext-old",
            (now - Duration::days(40)).date(),
        );
        seed_transaction(&conn, bank.id, -20.0, "Food", "ext-new", now.date());

        let summary = financial_summary(1, Period::Month, now, &conn).unwrap();

        assert_eq!(summary.transaction_count, 1);
        assert_eq!(summary.total_expenses, 20.0);
    }
}
