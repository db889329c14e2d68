//! Defines the user model and its database functions.
//!
//! Authentication is handled upstream; this record exists so budget alerts
//! have a recipient address.

use rusqlite::{Connection, Row};

use crate::Error;

/// Alias for the type used for user IDs, to make intent clearer.
pub type UserId = i64;

/// A registered user of the app.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID.
    pub id: UserId,
    /// The address budget alerts are sent to.
    pub email: String,
    /// The name used to address the user in notifications.
    pub name: String,
}

/// Create the user table in the database.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create a new user in the database.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn create_user(email: &str, name: &str, connection: &Connection) -> Result<User, Error> {
    let user = connection
        .prepare("INSERT INTO user (email, name) VALUES (?1, ?2) RETURNING id, email, name")?
        .query_row((email, name), map_user_row)?;

    Ok(user)
}

/// Retrieve a user from the database by their `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_user(id: UserId, connection: &Connection) -> Result<User, Error> {
    let user = connection
        .prepare("SELECT id, email, name FROM user WHERE id = :id")?
        .query_row(&[(":id", &id)], map_user_row)?;

    Ok(user)
}

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
    })
}

#[cfg(test)]
mod user_tests {
    use rusqlite::Connection;

    use crate::Error;

    use super::{create_user, create_user_table, get_user};

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_user_table(&conn).unwrap();
        conn
    }

    #[test]
    fn create_and_get_user() {
        let conn = get_test_connection();

        let created = create_user("jo@example.com", "Jo", &conn).unwrap();
        let fetched = get_user(created.id, &conn).unwrap();

        assert_eq!(created, fetched);
    }

    #[test]
    fn get_missing_user_is_not_found() {
        let conn = get_test_connection();

        assert_eq!(get_user(404, &conn), Err(Error::NotFound));
    }
}
