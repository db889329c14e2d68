//! The transactional email seam and the alert cooldown ledger.
//!
//! The ledger records which (user, category, severity) alerts were sent so
//! the same alert is not re-sent within the cooldown window.

use async_trait::async_trait;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use crate::{Error, user::UserId};

/// How long a sent alert suppresses identical alerts.
pub const ALERT_COOLDOWN: Duration = Duration::hours(24);

/// A rendered email ready to hand to the delivery service.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    /// The recipient address.
    pub to: String,
    /// The subject line.
    pub subject: String,
    /// The plain-text body.
    pub body: String,
}

/// Errors reported by a [Mailer].
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The delivery service rejected or failed the send.
    #[error("could not send email: {0}")]
    Send(String),
}

/// Sends transactional email through the configured delivery service.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `message`. Failures are reported, never retried here.
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// A mailer that logs instead of sending.
///
/// Used by the server binary when no delivery service is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = message.to,
            subject = message.subject,
            "email delivery is not configured, logging instead"
        );

        Ok(())
    }
}

/// How serious a budget breach is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Spending is approaching the limit.
    Warning,
    /// Spending has reached or passed the limit.
    Critical,
}

impl Severity {
    /// The severity's database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Create the email notification ledger table in the database.
pub fn create_email_notification_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS email_notification (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                percentage REAL NOT NULL,
                sent_at TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_notification_lookup
             ON email_notification(user_id, category, severity, sent_at)",
        (),
    )?;

    Ok(())
}

/// Check whether an identical alert was sent within the cooldown window.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn was_recently_sent(
    user_id: UserId,
    category: &str,
    severity: Severity,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<bool, Error> {
    let cutoff = now - ALERT_COOLDOWN;

    let count: i64 = connection
        .prepare(
            "SELECT COUNT(id) FROM email_notification
                 WHERE user_id = ?1 AND category = ?2 AND severity = ?3 AND sent_at >= ?4",
        )?
        .query_row((user_id, category, severity.as_str(), cutoff), |row| {
            row.get(0)
        })?;

    Ok(count > 0)
}

/// Record that an alert email was sent.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an unexpected SQL error.
pub fn record_notification(
    user_id: UserId,
    category: &str,
    severity: Severity,
    percentage: f64,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO email_notification (user_id, category, severity, percentage, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        (user_id, category, severity.as_str(), percentage, now),
    )?;

    Ok(())
}
