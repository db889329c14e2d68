//! Defines the core data model and database queries for budgets.
//!
//! Spending against a budget is always derived at read time from the
//! transaction table; it is never stored.

use std::collections::HashMap;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    Error, category::normalize_category, transaction::list_transactions_in_range, user::UserId,
};

/// Alias for the type used for budget IDs, to make intent clearer.
pub type BudgetId = i64;

/// The window a budget's limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// The trailing 7 days.
    Week,
    /// The trailing 30 days.
    #[default]
    Month,
    /// The trailing 90 days.
    Quarter,
    /// The trailing 365 days.
    Year,
}

impl Period {
    /// The period's database and API representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }

    /// Parse a period name from client input.
    ///
    /// # Errors
    /// Returns an [Error::InvalidPeriod] for anything outside the vocabulary.
    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            "year" => Ok(Period::Year),
            other => Err(Error::InvalidPeriod(other.to_owned())),
        }
    }

    /// The length of the trailing window.
    pub fn window(self) -> Duration {
        match self {
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
            Period::Quarter => Duration::days(90),
            Period::Year => Duration::days(365),
        }
    }
}

/// A per-category spending ceiling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetLimit {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The user the budget belongs to.
    pub user_id: UserId,
    /// The normalized category the limit applies to.
    pub category: String,
    /// The spending ceiling for the period.
    pub limit: f64,
    /// The window the ceiling applies to.
    pub period: Period,
    /// Inactive budgets are kept but ignored.
    pub is_active: bool,
}

/// A budget joined with its derived spending figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The normalized category the limit applies to.
    pub category: String,
    /// The spending ceiling for the period.
    pub limit: f64,
    /// The window the ceiling applies to.
    pub period: Period,
    /// Total spending in the category over the window.
    pub spent: f64,
    /// `limit - spent`. Negative once the budget is blown.
    pub remaining: f64,
    /// `spent / limit` as a percentage. Zero for a zero limit.
    pub percentage: f64,
}

/// Create the budget table in the database.
pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                \"limit\" REAL NOT NULL,
                period TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                UNIQUE(user_id, category, period)
                )",
        (),
    )?;

    Ok(())
}

/// Create or update the budget for (user, category, period).
///
/// The category is normalized before it is stored so budget matching uses
/// the same vocabulary as every other consumer.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn upsert_budget(
    user_id: UserId,
    category: &str,
    limit: f64,
    period: Period,
    connection: &Connection,
) -> Result<BudgetLimit, Error> {
    let category = normalize_category(category);

    let budget = connection
        .prepare(
            "INSERT INTO budget (user_id, category, \"limit\", period, is_active)
                 VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(user_id, category, period) DO UPDATE SET
                 \"limit\" = excluded.\"limit\",
                 is_active = 1
             RETURNING id, user_id, category, \"limit\", period, is_active",
        )?
        .query_row(
            (user_id, &category, limit, period.as_str()),
            map_budget_row,
        )?;

    Ok(budget)
}

/// Deactivate one of `user_id`'s budgets.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a budget owned by
///   `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn deactivate_budget(
    id: BudgetId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let updated = connection.execute(
        "UPDATE budget SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
        (id, user_id),
    )?;

    if updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Retrieve `user_id`'s active budgets for `period`, ordered by category.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn list_active_budgets(
    user_id: UserId,
    period: Period,
    connection: &Connection,
) -> Result<Vec<BudgetLimit>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, category, \"limit\", period, is_active FROM budget
                 WHERE user_id = ?1 AND period = ?2 AND is_active = 1
                 ORDER BY category ASC",
        )?
        .query_map((user_id, period.as_str()), map_budget_row)?
        .map(|maybe_budget| maybe_budget.map_err(Error::SqlError))
        .collect()
}

/// Total spending per normalized category over the trailing window ending at
/// `now`.
///
/// Amounts are bucketed by [normalize_category] applied to the raw stored
/// label, so rows written before a vocabulary change still land in the right
/// bucket.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn spending_by_category(
    user_id: UserId,
    period: Period,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<HashMap<String, f64>, Error> {
    let end = now.date();
    let start = (now - period.window()).date();

    let mut spending = HashMap::new();

    for transaction in list_transactions_in_range(user_id, start, end, connection)? {
        let category = normalize_category(&transaction.category);
        *spending.entry(category).or_insert(0.0) += transaction.amount.abs();
    }

    Ok(spending)
}

/// Join `user_id`'s active budgets with their derived spending figures.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn budget_statuses(
    user_id: UserId,
    period: Period,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Vec<BudgetStatus>, Error> {
    let budgets = list_active_budgets(user_id, period, connection)?;
    let spending = spending_by_category(user_id, period, now, connection)?;

    Ok(budgets
        .into_iter()
        .map(|budget| {
            let spent = spending.get(&budget.category).copied().unwrap_or(0.0);
            let percentage = if budget.limit > 0.0 {
                spent / budget.limit * 100.0
            } else {
                0.0
            };

            BudgetStatus {
                id: budget.id,
                category: budget.category,
                limit: budget.limit,
                period: budget.period,
                spent,
                remaining: budget.limit - spent,
                percentage,
            }
        })
        .collect())
}

fn map_budget_row(row: &Row) -> Result<BudgetLimit, rusqlite::Error> {
    let period: String = row.get(4)?;

    Ok(BudgetLimit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: row.get(2)?,
        limit: row.get(3)?,
        period: Period::parse(&period).unwrap_or_default(),
        is_active: row.get(5)?,
    })
}
