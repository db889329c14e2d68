//! Database initialization.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    Error, budget::create_budget_table, connection::create_bank_connection_table,
    notify::create_email_notification_table, subscription::create_subscription_table,
    transaction::create_transaction_table, user::create_user_table,
};

/// Create the application's tables if they do not exist.
///
/// Runs in a single exclusive transaction so a half-initialized schema is
/// never left behind.
///
/// # Errors
/// Returns an [Error::SqlError] if any table cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_bank_connection_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_budget_table(&transaction)?;
    create_subscription_table(&transaction)?;
    create_email_notification_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
