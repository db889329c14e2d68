//! Defines the core data model and database queries for transactions.

use rusqlite::{Connection, Row};
use serde::Serialize;
use time::Date;

use crate::{Error, connection::ConnectionId, user::UserId};

/// Alias for the type used for transaction IDs, to make intent clearer.
pub type TransactionId = i64;

/// Whether money came in or went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money flowing into the account (positive amounts).
    Income,
    /// Money flowing out of the account (negative or zero amounts).
    Expense,
}

impl Direction {
    /// Derive the direction from the sign of `amount`.
    pub fn from_amount(amount: f64) -> Self {
        if amount > 0.0 {
            Direction::Income
        } else {
            Direction::Expense
        }
    }

    /// The direction's database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Income => "income",
            Direction::Expense => "expense",
        }
    }

    fn from_str(value: &str) -> Self {
        match value {
            "income" => Direction::Income,
            _ => Direction::Expense,
        }
    }
}

/// One financial movement, immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// The bank connection the transaction was fetched through.
    pub connection_id: ConnectionId,
    /// The signed amount. Positive is income, negative is an expense.
    pub amount: f64,
    /// The merchant name or remittance text from the bank.
    pub name: String,
    /// The raw category label the classifier produced.
    pub category: String,
    /// The label after [crate::category::normalize_category].
    ///
    /// Stored alongside the raw label so analytics and budget matching never
    /// re-derive it.
    pub normalized_category: String,
    /// When the transaction was booked.
    pub date: Date,
    /// The direction derived from the sign of the amount.
    pub direction: Direction,
    /// The aggregator's identifier for the movement, when it provides one.
    ///
    /// This is the primary dedup key. Some banks omit it, in which case the
    /// (connection, name, amount, date) tuple is checked instead.
    pub external_id: Option<String>,
}

/// The fields needed to store a new [Transaction].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// The user that owns the transaction.
    pub user_id: UserId,
    /// The bank connection the transaction was fetched through.
    pub connection_id: ConnectionId,
    /// The signed amount.
    pub amount: f64,
    /// The merchant name or remittance text from the bank.
    pub name: String,
    /// The raw category label the classifier produced.
    pub category: String,
    /// The label after [crate::category::normalize_category].
    pub normalized_category: String,
    /// When the transaction was booked.
    pub date: Date,
    /// The aggregator's identifier for the movement, when present.
    pub external_id: Option<String>,
}

/// Create the transaction table in the database.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                connection_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                normalized_category TEXT NOT NULL,
                date TEXT NOT NULL,
                direction TEXT NOT NULL,
                external_id TEXT
                )",
        (),
    )?;

    // The aggregator re-sends the same movements on every fetch; this index
    // is the backstop that keeps them from being stored twice even when two
    // syncs race.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_user_external_id
             ON \"transaction\"(user_id, external_id)
             WHERE external_id IS NOT NULL",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date)",
        (),
    )?;

    Ok(())
}

/// Create a new transaction in the database.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateTransaction] if a transaction with the same
///   (user, external ID) already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let direction = Direction::from_amount(new_transaction.amount);

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\"
                 (user_id, connection_id, amount, name, category, normalized_category, date, direction, external_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id, user_id, connection_id, amount, name, category, normalized_category, date, direction, external_id",
        )?
        .query_row(
            (
                new_transaction.user_id,
                new_transaction.connection_id,
                new_transaction.amount,
                &new_transaction.name,
                &new_transaction.category,
                &new_transaction.normalized_category,
                new_transaction.date,
                direction.as_str(),
                &new_transaction.external_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(sql_error, Some(_))
                if sql_error.extended_code == 2067 =>
            {
                Error::DuplicateTransaction
            }
            error => error.into(),
        })?;

    Ok(transaction)
}

/// Check whether `user_id` already has a transaction with `external_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn transaction_exists_by_external_id(
    user_id: UserId,
    external_id: &str,
    connection: &Connection,
) -> Result<bool, Error> {
    let count: i64 = connection
        .prepare("SELECT COUNT(id) FROM \"transaction\" WHERE user_id = ?1 AND external_id = ?2")?
        .query_row((user_id, external_id), |row| row.get(0))?;

    Ok(count > 0)
}

/// Check whether a transaction matching all of (connection, name, amount,
/// date) is already stored for `user_id`.
///
/// This is the fallback dedup key for banks that omit external transaction
/// IDs.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn transaction_exists_by_fields(
    user_id: UserId,
    connection_id: ConnectionId,
    name: &str,
    amount: f64,
    date: Date,
    connection: &Connection,
) -> Result<bool, Error> {
    let count: i64 = connection
        .prepare(
            "SELECT COUNT(id) FROM \"transaction\"
                 WHERE user_id = ?1 AND connection_id = ?2 AND name = ?3 AND amount = ?4 AND date = ?5",
        )?
        .query_row((user_id, connection_id, name, amount, date), |row| {
            row.get(0)
        })?;

    Ok(count > 0)
}

/// Retrieve `user_id`'s transactions booked in `[start, end]`, newest first,
/// restricted to connections that are still connected.
///
/// Transactions orphaned by a partially-completed disconnect are filtered
/// out here.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn list_transactions_in_range(
    user_id: UserId,
    start: Date,
    end: Date,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT t.id, t.user_id, t.connection_id, t.amount, t.name, t.category,
                    t.normalized_category, t.date, t.direction, t.external_id
                 FROM \"transaction\" t
                 INNER JOIN bank_connection c ON c.id = t.connection_id
                 WHERE t.user_id = ?1 AND t.date BETWEEN ?2 AND ?3 AND c.status = 'connected'
                 ORDER BY t.date DESC, t.id DESC",
        )?
        .query_map((user_id, start, end), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::SqlError))
        .collect()
}

/// Get the total number of transactions stored for `user_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn count_transactions(user_id: UserId, connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row(
            "SELECT COUNT(id) FROM \"transaction\" WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Map a database row to a [Transaction].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let direction: String = row.get(8)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        connection_id: row.get(2)?,
        amount: row.get(3)?,
        name: row.get(4)?,
        category: row.get(5)?,
        normalized_category: row.get(6)?,
        date: row.get(7)?,
        direction: Direction::from_str(&direction),
        external_id: row.get(9)?,
    })
}
