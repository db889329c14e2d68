//! Defines the core data model and database queries for bank connections.

use rusqlite::{Connection, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{Error, user::UserId};

/// Alias for the type used for bank connection IDs, to make intent clearer.
pub type ConnectionId = i64;

/// The lifecycle state of a bank connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// The connection is live and can be synced.
    Connected,
    /// The user disconnected the bank.
    Disconnected,
    /// The last sync failed in a way that needs the user's attention.
    Error,
}

impl ConnectionStatus {
    /// The status's database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }

    fn from_str(value: &str) -> Self {
        match value {
            "connected" => ConnectionStatus::Connected,
            "disconnected" => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Error,
        }
    }
}

/// One linked external bank account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankConnection {
    /// The ID of the connection.
    pub id: ConnectionId,
    /// The user that linked the bank.
    pub user_id: UserId,
    /// The aggregator's consent-session identifier. Unique per user.
    pub requisition_id: String,
    /// The display name of the institution.
    pub bank_name: String,
    /// The lifecycle state of the connection.
    pub status: ConnectionStatus,
    /// When transactions were last fetched for this connection.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync: Option<OffsetDateTime>,
    /// The balance reported by the provider at the last sync.
    pub balance: f64,
    /// ISO currency code.
    pub currency: String,
    /// When the connection was created. Drives keep-the-oldest downgrade
    /// enforcement.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Create the bank connection table in the database.
pub fn create_bank_connection_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS bank_connection (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                requisition_id TEXT NOT NULL,
                bank_name TEXT NOT NULL,
                status TEXT NOT NULL,
                last_sync TEXT,
                balance REAL NOT NULL DEFAULT 0,
                currency TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, requisition_id)
                )",
        (),
    )?;

    Ok(())
}

/// Create a new bank connection in the database.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateConnection] if the user already linked this
///   requisition,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_bank_connection(
    user_id: UserId,
    requisition_id: &str,
    bank_name: &str,
    balance: f64,
    currency: &str,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<BankConnection, Error> {
    let bank_connection = connection
        .prepare(
            "INSERT INTO bank_connection
                 (user_id, requisition_id, bank_name, status, last_sync, balance, currency, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7)
             RETURNING id, user_id, requisition_id, bank_name, status, last_sync, balance, currency, created_at",
        )?
        .query_row(
            (
                user_id,
                requisition_id,
                bank_name,
                ConnectionStatus::Connected.as_str(),
                balance,
                currency,
                created_at,
            ),
            map_connection_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(sql_error, Some(_))
                if sql_error.extended_code == 2067 =>
            {
                Error::DuplicateConnection(requisition_id.to_owned())
            }
            error => error.into(),
        })?;

    Ok(bank_connection)
}

/// Retrieve one of `user_id`'s connections by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a connection owned by
///   `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_bank_connection(
    id: ConnectionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<BankConnection, Error> {
    let bank_connection = connection
        .prepare(
            "SELECT id, user_id, requisition_id, bank_name, status, last_sync, balance, currency, created_at
                 FROM bank_connection WHERE id = ?1 AND user_id = ?2",
        )?
        .query_row((id, user_id), map_connection_row)?;

    Ok(bank_connection)
}

/// Retrieve all of `user_id`'s connections, most recently created first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn list_connections(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<BankConnection>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, requisition_id, bank_name, status, last_sync, balance, currency, created_at
                 FROM bank_connection WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?
        .query_map([user_id], map_connection_row)?
        .map(|maybe_connection| maybe_connection.map_err(Error::SqlError))
        .collect()
}

/// Retrieve `user_id`'s connected banks, oldest first.
///
/// The ordering (creation time, then ID) makes downgrade enforcement
/// deterministic: the connection kept on a downgrade is always the one
/// created first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn list_connected_oldest_first(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<BankConnection>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, requisition_id, bank_name, status, last_sync, balance, currency, created_at
                 FROM bank_connection
                 WHERE user_id = ?1 AND status = 'connected'
                 ORDER BY created_at ASC, id ASC",
        )?
        .query_map([user_id], map_connection_row)?
        .map(|maybe_connection| maybe_connection.map_err(Error::SqlError))
        .collect()
}

/// Count `user_id`'s currently connected banks.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn count_connected(user_id: UserId, connection: &Connection) -> Result<usize, Error> {
    let count: i64 = connection
        .prepare("SELECT COUNT(id) FROM bank_connection WHERE user_id = ?1 AND status = 'connected'")?
        .query_row([user_id], |row| row.get(0))?;

    Ok(count as usize)
}

/// Record a successful sync: refresh the balance and the sync timestamp.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid connection,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn mark_synced(
    id: ConnectionId,
    balance: f64,
    synced_at: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let updated = connection.execute(
        "UPDATE bank_connection SET balance = ?1, last_sync = ?2, status = 'connected' WHERE id = ?3",
        (balance, synced_at, id),
    )?;

    if updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Delete one of `user_id`'s connections and all of its transactions.
///
/// The transactions are deleted first. A crash between the two statements
/// leaves orphaned transactions, which every listing tolerates by joining on
/// connection existence.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a connection owned by
///   `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_bank_connection(
    id: ConnectionId,
    user_id: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    // Verifies ownership before anything is deleted.
    get_bank_connection(id, user_id, connection)?;

    connection.execute(
        "DELETE FROM \"transaction\" WHERE connection_id = ?1",
        [id],
    )?;
    connection.execute("DELETE FROM bank_connection WHERE id = ?1", [id])?;

    Ok(())
}

/// Map a database row to a [BankConnection].
pub fn map_connection_row(row: &Row) -> Result<BankConnection, rusqlite::Error> {
    let status: String = row.get(4)?;

    Ok(BankConnection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        requisition_id: row.get(2)?,
        bank_name: row.get(3)?,
        status: ConnectionStatus::from_str(&status),
        last_sync: row.get(5)?,
        balance: row.get(6)?,
        currency: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod bank_connection_tests {
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::{Error, db::initialize, transaction::count_transactions};

    use super::{
        ConnectionStatus, count_connected, create_bank_connection, delete_bank_connection,
        get_bank_connection, list_connected_oldest_first,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn create_and_get_connection() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();

        let created =
            create_bank_connection(1, "req-1", "Test Bank", 100.0, "EUR", now, &conn).unwrap();
        let fetched = get_bank_connection(created.id, 1, &conn).unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.status, ConnectionStatus::Connected);
        assert_eq!(fetched.last_sync, None);
    }

    #[test]
    fn duplicate_requisition_for_same_user_is_rejected() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        create_bank_connection(1, "req-1", "Test Bank", 0.0, "EUR", now, &conn).unwrap();

        let duplicate = create_bank_connection(1, "req-1", "Test Bank", 0.0, "EUR", now, &conn);

        assert_eq!(
            duplicate,
            Err(Error::DuplicateConnection("req-1".to_owned()))
        );
    }

    #[test]
    fn same_requisition_for_different_users_is_allowed() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        create_bank_connection(1, "req-1", "Test Bank", 0.0, "EUR", now, &conn).unwrap();

        let result = create_bank_connection(2, "req-1", "Test Bank", 0.0, "EUR", now, &conn);

        assert!(result.is_ok());
    }

    #[test]
    fn connections_are_scoped_to_their_owner() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let created =
            create_bank_connection(1, "req-1", "Test Bank", 0.0, "EUR", now, &conn).unwrap();

        let other_user = get_bank_connection(created.id, 2, &conn);

        assert_eq!(other_user, Err(Error::NotFound));
    }

    #[test]
    fn oldest_first_ordering_is_deterministic() {
        let conn = get_test_connection();
        let base = OffsetDateTime::now_utc();
        let third =
            create_bank_connection(1, "req-3", "C", 0.0, "EUR", base + Duration::days(2), &conn)
                .unwrap();
        let first = create_bank_connection(1, "req-1", "A", 0.0, "EUR", base, &conn).unwrap();
        let second =
            create_bank_connection(1, "req-2", "B", 0.0, "EUR", base + Duration::days(1), &conn)
                .unwrap();

        let connected = list_connected_oldest_first(1, &conn).unwrap();

        let ids: Vec<_> = connected.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn delete_removes_connection_and_its_transactions() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        let connection =
            create_bank_connection(1, "req-1", "Test Bank", 0.0, "EUR", now, &conn).unwrap();
        conn.execute(
            "INSERT INTO \"transaction\"
                 (user_id, connection_id, amount, name, category, normalized_category, date, direction, external_id)
             VALUES (1, ?1, -5.0, 'Coffee', 'Food', 'Food', '2025-06-01', 'expense', 'ext-1')",
            [connection.id],
        )
        .unwrap();

        delete_bank_connection(connection.id, 1, &conn).unwrap();

        assert_eq!(get_bank_connection(connection.id, 1, &conn), Err(Error::NotFound));
        assert_eq!(count_transactions(1, &conn).unwrap(), 0);
    }

    #[test]
    fn delete_missing_connection_is_not_found() {
        let conn = get_test_connection();

        assert_eq!(delete_bank_connection(42, 1, &conn), Err(Error::NotFound));
    }

    #[test]
    fn count_ignores_disconnected_banks() {
        let conn = get_test_connection();
        let now = OffsetDateTime::now_utc();
        create_bank_connection(1, "req-1", "A", 0.0, "EUR", now, &conn).unwrap();
        let second = create_bank_connection(1, "req-2", "B", 0.0, "EUR", now, &conn).unwrap();
        conn.execute(
            "UPDATE bank_connection SET status = 'disconnected' WHERE id = ?1",
            [second.id],
        )
        .unwrap();

        assert_eq!(count_connected(1, &conn).unwrap(), 1);
    }
}
